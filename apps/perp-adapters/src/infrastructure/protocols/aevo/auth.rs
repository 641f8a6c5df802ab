//! Aevo request signing.
//!
//! `AEVO-SIGNATURE` is the hex HMAC-SHA256 of
//! `key,timestamp,METHOD,path_with_query,body` under the API secret, with a
//! nanosecond timestamp.

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::Sha256;

use crate::error::AdapterError;
use crate::infrastructure::http::RequestAuth;

type HmacSha256 = Hmac<Sha256>;

/// API key credentials.
#[derive(Clone)]
pub struct AevoAuth {
    key: String,
    secret: String,
}

impl std::fmt::Debug for AevoAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AevoAuth").field("key", &self.key).finish_non_exhaustive()
    }
}

impl AevoAuth {
    /// Create from key and secret.
    #[must_use]
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }

    /// Hex HMAC over the comma-joined request parts.
    pub fn signature(&self, timestamp: &str, method: &Method, path_with_query: &str, body: &str) -> Result<String, AdapterError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| AdapterError::Signing(format!("invalid Aevo secret: {e}")))?;
        let message = [self.key.as_str(), timestamp, method.as_str(), path_with_query, body].join(",");
        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn headers_at(&self, timestamp: &str, method: &Method, path_with_query: &str, body: &str) -> Result<Vec<(String, String)>, AdapterError> {
        Ok(vec![
            ("AEVO-KEY".to_string(), self.key.clone()),
            ("AEVO-TIMESTAMP".to_string(), timestamp.to_string()),
            ("AEVO-SIGNATURE".to_string(), self.signature(timestamp, method, path_with_query, body)?),
        ])
    }
}

impl RequestAuth for AevoAuth {
    fn headers(&self, method: &Method, path_with_query: &str, body: &str) -> Result<Vec<(String, String)>, AdapterError> {
        let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string();
        self.headers_at(&timestamp, method, path_with_query, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_hmac_of_joined_parts() {
        let auth = AevoAuth::new("key", "secret");
        let signature = auth.signature("123", &Method::GET, "/account", "").unwrap();

        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"key,123,GET,/account,");
        assert_eq!(signature, hex::encode(mac.finalize().into_bytes()));
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn headers_carry_key_and_timestamp() {
        let auth = AevoAuth::new("key", "secret");
        let headers = auth.headers_at("42", &Method::DELETE, "/orders/1", "").unwrap();
        assert_eq!(headers[0], ("AEVO-KEY".to_string(), "key".to_string()));
        assert_eq!(headers[1].1, "42");
        assert_ne!(
            headers[2].1,
            auth.signature("42", &Method::GET, "/orders/1", "").unwrap()
        );
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", AevoAuth::new("key", "hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
