//! Per-request context threaded through locking strategy calls.

/// State one request carries between `get` and `set`/`delete`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Encoded body observed at read time (or last written), for change detection.
    pub prior_body: Option<Vec<u8>>,

    /// No record existed for this id when the request started.
    pub is_new: bool,

    /// Holder token of the lock this request owns, if any.
    pub lock_token: Option<String>,

    /// Correlation id supplied by the host, for logging.
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Context for an id that was presented by the client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a session that has never been stored.
    #[must_use]
    pub fn for_new_session() -> Self {
        Self {
            is_new: true,
            ..Self::default()
        }
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Returns `true` while this request holds a lock.
    #[must_use]
    pub const fn holds_lock(&self) -> bool {
        self.lock_token.is_some()
    }
}
