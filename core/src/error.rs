//! Error types for session persistence.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Failures reported by a key-value store client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The expectations attached to a conditional update did not hold.
    #[error("Conditional check failed")]
    ConditionalCheckFailed,

    /// The backing service rejected or failed the call.
    #[error("Store service error: {0}")]
    Service(String),

    /// Table creation targeted a table that already exists.
    #[error("Table already exists: {0}")]
    TableExists(String),

    /// Table deletion targeted a table that does not exist.
    #[error("Table not found: {0}")]
    TableNotFound(String),
}

/// Comprehensive error taxonomy for session persistence.
///
/// Every error raised by a locking strategy is first handed to the
/// configured [`ErrorHandler`](crate::handler::ErrorHandler) and then
/// returned unchanged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    // ═══════════════════════════════════════════════════════════
    // Store Errors
    // ═══════════════════════════════════════════════════════════

    /// Backend call failed.
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(StoreError),

    /// A caller-supplied or lock-ownership precondition did not hold.
    #[error("Conditional write rejected for session {id}")]
    ConditionFailed {
        /// Token portion of the session id
        id: String,
    },

    /// Exclusive lock could not be acquired within the retry budget.
    #[error("Timed out acquiring lock for session {id} after {attempts} attempts ({waited:?})")]
    LockTimeout {
        /// Token portion of the session id
        id: String,
        /// Number of acquisition attempts made
        attempts: usize,
        /// Time spent waiting between attempts
        waited: Duration,
    },

    /// Provisioned table did not reach the requested state in time.
    #[error("Table {table} not ready")]
    TableNotReady {
        /// Table name
        table: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Data Errors
    // ═══════════════════════════════════════════════════════════

    /// Stored session body could not be decoded.
    #[error("Corrupt session data: {0}")]
    CorruptSessionData(String),

    /// Session body could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A forced attribute targeted a column managed by the engine.
    #[error("Attribute {0} is reserved")]
    ReservedAttribute(String),

    // ═══════════════════════════════════════════════════════════
    // Identifier Errors
    // ═══════════════════════════════════════════════════════════

    /// Session id failed signature verification.
    #[error("Invalid session id: {reason}")]
    InvalidSessionId {
        /// Why verification failed
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Configuration Errors
    // ═══════════════════════════════════════════════════════════

    /// No secret key was configured for signing session ids.
    #[error("Session secret key is missing")]
    MissingSecretKey,

    /// Configuration was rejected.
    #[error("Invalid session configuration: {0}")]
    Config(String),
}

impl SessionError {
    /// Stable label used for log fields and metric labels.
    ///
    /// # Examples
    ///
    /// ```
    /// # use composable_session_core::SessionError;
    /// assert_eq!(SessionError::MissingSecretKey.kind(), "missing_secret_key");
    /// ```
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::ConditionFailed { .. } => "condition_failed",
            Self::LockTimeout { .. } => "lock_timeout",
            Self::TableNotReady { .. } => "table_not_ready",
            Self::CorruptSessionData(_) => "corrupt_session_data",
            Self::Serialization(_) => "serialization",
            Self::ReservedAttribute(_) => "reserved_attribute",
            Self::InvalidSessionId { .. } => "invalid_session_id",
            Self::MissingSecretKey => "missing_secret_key",
            Self::Config(_) => "config",
        }
    }

    /// Returns `true` if this error points at a forged or tampered client input.
    ///
    /// # Examples
    ///
    /// ```
    /// # use composable_session_core::SessionError;
    /// let err = SessionError::InvalidSessionId { reason: "signature mismatch".into() };
    /// assert!(err.is_integrity_issue());
    /// assert!(!SessionError::MissingSecretKey.is_integrity_issue());
    /// ```
    #[must_use]
    pub const fn is_integrity_issue(&self) -> bool {
        matches!(self, Self::InvalidSessionId { .. })
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_converts_to_store_unavailable() {
        let err: SessionError = StoreError::Service("timeout".to_string()).into();
        assert_eq!(
            err,
            SessionError::StoreUnavailable(StoreError::Service("timeout".to_string()))
        );
        assert_eq!(err.kind(), "store_unavailable");
    }

    #[test]
    fn test_lock_timeout_message() {
        let err = SessionError::LockTimeout {
            id: "abc".to_string(),
            attempts: 3,
            waited: Duration::from_millis(350),
        };
        assert!(err.to_string().contains("after 3 attempts"));
    }
}
