//! Attribute codec.
//!
//! Turns a [`SessionData`] bag into the bytes stored in the `data` column and
//! back. Encoding is bincode over an ordered map, so equal bags always yield
//! identical bytes; change detection relies on this.

use crate::error::{Result, SessionError};
use crate::value::SessionData;

/// Encode a session bag.
///
/// # Errors
///
/// Returns [`SessionError::Serialization`] if bincode rejects the value.
pub fn encode(data: &SessionData) -> Result<Vec<u8>> {
    bincode::serialize(data).map_err(|e| SessionError::Serialization(e.to_string()))
}

/// Decode a stored session body.
///
/// An empty body decodes to an empty bag.
///
/// # Errors
///
/// Returns [`SessionError::CorruptSessionData`] if the bytes are malformed.
pub fn decode(bytes: &[u8]) -> Result<SessionData> {
    if bytes.is_empty() {
        return Ok(SessionData::new());
    }

    bincode::deserialize(bytes).map_err(|e| SessionError::CorruptSessionData(e.to_string()))
}
