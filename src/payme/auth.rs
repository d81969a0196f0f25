//! Caller authentication for the processor callback.
//!
//! The processor sends `Authorization: Basic base64(<login>:<secret key>)`.
//! Credentials are compared through an HMAC tag so the comparison runs in
//! constant time.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const BASIC_PREFIX: &str = "Basic ";

#[derive(Clone)]
pub struct SignatureVerifier {
    tag_key: Vec<u8>,
    expected_tag: Vec<u8>,
}

impl SignatureVerifier {
    pub fn new(merchant_login: &str, secret_key: &str) -> anyhow::Result<Self> {
        if secret_key.is_empty() {
            anyhow::bail!("merchant secret key must not be empty");
        }

        let tag_key = secret_key.as_bytes().to_vec();
        let credential = format!("{}:{}", merchant_login, secret_key);
        let mut mac = HmacSha256::new_from_slice(&tag_key)
            .map_err(|e| anyhow::anyhow!("invalid credential key: {}", e))?;
        mac.update(credential.as_bytes());
        let expected_tag = mac.finalize().into_bytes().to_vec();

        Ok(Self {
            tag_key,
            expected_tag,
        })
    }

    /// `true` only for an exact credential match. Pure predicate.
    pub fn verify(&self, authorization: Option<&str>) -> bool {
        let Some(encoded) = authorization
            .map(str::trim)
            .and_then(|value| value.strip_prefix(BASIC_PREFIX))
        else {
            return false;
        };

        let Ok(credential) = STANDARD.decode(encoded.trim()) else {
            return false;
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(&self.tag_key) else {
            return false;
        };
        mac.update(&credential);
        mac.verify_slice(&self.expected_tag).is_ok()
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

/// Builds the header value the processor would send. Used by tests and the
/// CLI's config report.
pub fn basic_authorization(merchant_login: &str, secret_key: &str) -> String {
    format!(
        "{}{}",
        BASIC_PREFIX,
        STANDARD.encode(format!("{}:{}", merchant_login, secret_key))
    )
}
