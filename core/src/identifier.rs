//! Signed session identifiers.
//!
//! An identifier handed to a client is `signature.token`:
//!
//! - **token**: 32 random bytes, base64url without padding
//! - **signature**: lowercase hex HMAC-SHA256 of the token under the server secret
//!
//! Neither alphabet contains `.`, so splitting is unambiguous. A
//! [`SessionId`] can only be obtained from [`SessionSigner::generate`] or
//! [`SessionSigner::verify`], which keeps unverified strings away from the
//! store.
//!
//! # Example
//!
//! ```
//! use composable_session_core::identifier::{IdCheck, SessionSigner};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let signer = SessionSigner::new("server-secret")?;
//! let id = signer.generate();
//!
//! let verified = signer.verify(id.as_str())?;
//! assert_eq!(verified.token(), id.token());
//!
//! assert!(matches!(signer.check(None), IdCheck::Missing));
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SessionError};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Separator between signature and token.
pub const SEPARATOR: char = '.';

/// Random bytes per token.
const TOKEN_BYTES: usize = 32;

/// Length of a hex-encoded SHA-256 MAC.
const SIGNATURE_LEN: usize = 64;

/// A verified (or freshly generated) session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId {
    raw: String,
    split: usize,
}

impl SessionId {
    fn from_parts(signature: &str, token: &str) -> Self {
        Self {
            raw: format!("{signature}{SEPARATOR}{token}"),
            split: signature.len(),
        }
    }

    /// Full identifier as handed to the client and used as the store key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Random token portion.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.raw[self.split + SEPARATOR.len_utf8()..]
    }

    /// Signature portion.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.raw[..self.split]
    }

    /// Short prefix of the token, safe for log output.
    #[must_use]
    pub fn log_prefix(&self) -> &str {
        let token = self.token();
        token.get(..8).unwrap_or(token)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Outcome of inspecting the identifier a client presented.
#[derive(Debug, Clone, PartialEq)]
pub enum IdCheck {
    /// Nothing was presented; issue a new session.
    Missing,
    /// Signature verified.
    Valid(SessionId),
    /// Something was presented but failed verification; issue a new
    /// session and report the error.
    Invalid(SessionError),
}

/// Generates and verifies signed session identifiers.
#[derive(Clone)]
pub struct SessionSigner {
    mac: HmacSha256,
}

impl SessionSigner {
    /// Create a signer from the server secret.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingSecretKey`] if the secret is empty.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(SessionError::MissingSecretKey);
        }

        let mac = HmacSha256::new_from_slice(secret).map_err(|_| SessionError::MissingSecretKey)?;
        Ok(Self { mac })
    }

    /// Generate a new signed identifier.
    #[must_use]
    pub fn generate(&self) -> SessionId {
        let bytes: [u8; TOKEN_BYTES] = rand::random();
        let token = URL_SAFE_NO_PAD.encode(bytes);
        let signature = self.sign(&token);
        SessionId::from_parts(&signature, &token)
    }

    /// Hex HMAC of a token.
    #[must_use]
    pub fn sign(&self, token: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a presented identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidSessionId`] if the identifier is
    /// malformed or its signature does not match.
    pub fn verify(&self, candidate: &str) -> Result<SessionId> {
        let Some((signature, token)) = candidate.split_once(SEPARATOR) else {
            return Err(invalid("missing separator"));
        };

        if signature.len() != SIGNATURE_LEN || token.is_empty() || token.contains(SEPARATOR) {
            return Err(invalid("malformed identifier"));
        }

        let expected = self.sign(token);
        if !constant_time_eq::constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return Err(invalid("signature mismatch"));
        }

        Ok(SessionId::from_parts(signature, token))
    }

    /// Classify whatever the client presented.
    #[must_use]
    pub fn check(&self, presented: Option<&str>) -> IdCheck {
        match presented {
            None => IdCheck::Missing,
            Some(candidate) if candidate.is_empty() => IdCheck::Missing,
            Some(candidate) => match self.verify(candidate) {
                Ok(id) => IdCheck::Valid(id),
                Err(err) => IdCheck::Invalid(err),
            },
        }
    }
}

impl fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSigner").finish_non_exhaustive()
    }
}

fn invalid(reason: &str) -> SessionError {
    SessionError::InvalidSessionId {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn signer() -> SessionSigner {
        SessionSigner::new("unit-test-secret").unwrap()
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        assert_eq!(SessionSigner::new("").unwrap_err(), SessionError::MissingSecretKey);
    }

    #[test]
    fn test_generated_id_verifies() {
        let signer = signer();
        let id = signer.generate();

        assert_eq!(id.signature().len(), SIGNATURE_LEN);
        assert!(!id.signature().contains(SEPARATOR));
        assert_eq!(signer.verify(id.as_str()).unwrap(), id);
    }

    #[test]
    fn test_generated_ids_differ() {
        let signer = signer();
        let first = signer.generate();
        let second = signer.generate();

        assert_ne!(first.token(), second.token());
        assert!(signer.verify(first.as_str()).is_ok());
        assert!(signer.verify(second.as_str()).is_ok());
    }

    #[test]
    fn test_single_character_mutation_is_rejected() {
        let signer = signer();
        let id = signer.generate();
        let original: Vec<char> = id.as_str().chars().collect();

        for position in 0..original.len() {
            let mut mutated = original.clone();
            mutated[position] = if original[position] == 'a' { 'b' } else { 'a' };
            let mutated: String = mutated.into_iter().collect();

            assert!(
                signer.verify(&mutated).is_err(),
                "mutation at {position} verified"
            );
        }
    }

    #[test]
    fn test_other_key_rejects() {
        let id = signer().generate();
        let other = SessionSigner::new("another-secret").unwrap();
        assert!(matches!(
            other.verify(id.as_str()),
            Err(SessionError::InvalidSessionId { .. })
        ));
    }

    #[test]
    fn test_check_distinguishes_missing_from_invalid() {
        let signer = signer();
        assert_eq!(signer.check(None), IdCheck::Missing);
        assert_eq!(signer.check(Some("")), IdCheck::Missing);
        assert!(matches!(signer.check(Some("no-separator")), IdCheck::Invalid(_)));

        let id = signer.generate();
        assert_eq!(signer.check(Some(id.as_str())), IdCheck::Valid(id));
    }

    #[test]
    fn test_debug_hides_secret() {
        assert_eq!(format!("{:?}", signer()), "SessionSigner { .. }");
    }
}
