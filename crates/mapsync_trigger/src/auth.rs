//! Bearer-token authorization for trigger requests.
//!
//! The expected header value is `Bearer <secret>`. Both sides are hashed
//! with SHA-256 and the digests compared in constant time.

use crate::error::{TriggerError, TriggerResult};
use sha2::{Digest, Sha256};

const SCHEME: &str = "Bearer ";

/// Validates the `Authorization` header of trigger requests.
#[derive(Clone)]
pub struct BearerAuth {
    expected: Option<[u8; 32]>,
}

impl BearerAuth {
    /// Creates a validator requiring `Bearer <secret>`.
    pub fn new(secret: &str) -> Self {
        Self {
            expected: Some(digest(&format!("{SCHEME}{secret}"))),
        }
    }

    /// Creates a validator that accepts every request.
    pub fn disabled() -> Self {
        Self { expected: None }
    }

    /// Creates a validator from an optional secret.
    pub fn from_secret(secret: Option<&str>) -> Self {
        secret.map_or_else(Self::disabled, Self::new)
    }

    /// Returns true if requests must carry a token.
    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }

    /// Checks an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the header is missing or does not match.
    pub fn validate(&self, authorization: Option<&str>) -> TriggerResult<()> {
        let Some(expected) = &self.expected else {
            return Ok(());
        };
        let Some(header) = authorization else {
            return Err(TriggerError::Unauthorized("missing authorization header".into()));
        };
        if constant_time_eq(&digest(header), expected) {
            Ok(())
        } else {
            Err(TriggerError::Unauthorized("invalid bearer token".into()))
        }
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exact_bearer_token() {
        let auth = BearerAuth::new("s3cret");
        assert!(auth.validate(Some("Bearer s3cret")).is_ok());
    }

    #[test]
    fn rejects_missing_or_wrong_token() {
        let auth = BearerAuth::new("s3cret");
        for header in [
            None,
            Some(""),
            Some("s3cret"),
            Some("Bearer "),
            Some("Bearer s3cret "),
            Some("bearer s3cret"),
            Some("Bearer S3CRET"),
        ] {
            let err = auth.validate(header).unwrap_err();
            assert!(err.is_client_error(), "{header:?} should be rejected");
        }
    }

    #[test]
    fn empty_secret_expects_bare_scheme() {
        let auth = BearerAuth::new("");
        assert!(auth.validate(Some("Bearer ")).is_ok());
        assert!(auth.validate(Some("Bearer x")).is_err());
    }

    #[test]
    fn disabled_accepts_everything() {
        let auth = BearerAuth::from_secret(None);
        assert!(!auth.is_enabled());
        assert!(auth.validate(None).is_ok());
        assert!(auth.validate(Some("Bearer anything")).is_ok());
    }

    #[test]
    fn debug_hides_secret() {
        let auth = BearerAuth::new("s3cret");
        assert!(!format!("{auth:?}").contains("s3cret"));
    }
}
