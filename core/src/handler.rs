//! Centralized error observation.
//!
//! Locking strategies hand every failure to an [`ErrorHandler`] before
//! returning it. Handlers observe (log, count, alert); they never swallow or
//! replace the error.

use crate::context::RequestContext;
use crate::error::{Result, SessionError};

/// Observer for session errors.
pub trait ErrorHandler: Send + Sync {
    /// Observe an error raised while serving `context`.
    fn handle(&self, error: &SessionError, context: &RequestContext);
}

/// Logs errors through `tracing`.
///
/// Integrity errors and lock timeouts are warnings (client or contention
/// driven); everything else is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorHandler;

impl ErrorHandler for TracingErrorHandler {
    fn handle(&self, error: &SessionError, context: &RequestContext) {
        let request_id = context.request_id.as_deref().unwrap_or("-");
        match error {
            SessionError::InvalidSessionId { .. } | SessionError::LockTimeout { .. } => {
                tracing::warn!(kind = error.kind(), request_id, error = %error, "Session error");
            }
            _ => {
                tracing::error!(kind = error.kind(), request_id, error = %error, "Session error");
            }
        }
    }
}

/// Report a failed result to the handler and return it unchanged.
///
/// # Errors
///
/// Returns the error contained in `result`, if any.
pub fn observe<T>(
    handler: &dyn ErrorHandler,
    context: &RequestContext,
    result: Result<T>,
) -> Result<T> {
    if let Err(err) = &result {
        handler.handle(err, context);
    }
    result
}
