use std::fmt;

#[cfg(feature = "crypto")]
use sha3::{Digest, Sha3_256};

/// Name of the header carrying the shared secret
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// The shared secret every authenticated request must present.
///
/// Only the SHA3-256 digest of the secret is kept in memory. Candidates are
/// digested the same way before comparison, so the work done does not depend
/// on how many leading bytes of the candidate happen to be correct.
#[cfg(feature = "crypto")]
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey([u8; 32]);

#[cfg(feature = "crypto")]
impl ApiKey {
    /// Create a new ApiKey, the secret must not be empty
    pub fn new(secret: &[u8]) -> anyhow::Result<Self> {
        if secret.is_empty() {
            return Err(anyhow::anyhow!("API key must not be empty"));
        }
        Ok(ApiKey(Self::digest(secret)))
    }

    /// Check a presented secret against this key
    pub fn matches(&self, candidate: &[u8]) -> bool {
        let candidate = Self::digest(candidate);
        self.0
            .iter()
            .zip(candidate.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    fn digest(secret: &[u8]) -> [u8; 32] {
        let mut hasher = Sha3_256::new();
        hasher.update(secret);
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&hasher.finalize());
        buf
    }
}

#[cfg(feature = "crypto")]
impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ApiKey(<redacted>)")
    }
}

#[cfg(feature = "crypto")]
impl<'a> TryFrom<&'a str> for ApiKey {
    type Error = anyhow::Error;
    fn try_from(val: &str) -> anyhow::Result<ApiKey> {
        ApiKey::new(val.as_bytes())
    }
}

#[cfg(all(test, feature = "crypto"))]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_matches() {
        let key = ApiKey::try_from("s3cret").expect("Invalid ApiKey");
        assert!(key.matches(b"s3cret"));
        assert!(!key.matches(b"s3cre"));
        assert!(!key.matches(b"S3cret"));
        assert!(!key.matches(b""));
    }

    #[test]
    fn test_api_key_rejects_empty() {
        assert!(ApiKey::try_from("").is_err());
    }

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key = ApiKey::try_from("s3cret").expect("Invalid ApiKey");
        assert_eq!(format!("{:?}", key), "ApiKey(<redacted>)");
    }
}
