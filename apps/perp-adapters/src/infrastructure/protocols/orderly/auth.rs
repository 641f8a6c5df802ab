//! Orderly request signing.
//!
//! Every private request carries the account id, the public Orderly key and
//! an ed25519 signature over `timestamp + METHOD + path_with_query + body`,
//! base64url encoded.

use alloy::sol_types::SolValue;
use alloy_primitives::{Address, B256, keccak256};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use ed25519_dalek::{Signer, SigningKey};
use reqwest::Method;

use crate::error::AdapterError;
use crate::infrastructure::http::RequestAuth;
use crate::infrastructure::protocols::common::now_millis;

const KEY_PREFIX: &str = "ed25519:";

/// `keccak256(abi.encode(address, keccak256(brokerId)))`.
#[must_use]
pub fn account_id(address: Address, broker_id: &str) -> B256 {
    keccak256((address, keccak256(broker_id.as_bytes())).abi_encode_params())
}

/// Parse an `ed25519:<base58>` secret. Accepts a 32-byte seed or a 64-byte
/// keypair.
pub fn parse_secret(secret: &str) -> Result<SigningKey, AdapterError> {
    let encoded = secret.trim().strip_prefix(KEY_PREFIX).unwrap_or(secret.trim());
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| AdapterError::Config(format!("invalid Orderly secret: {e}")))?;
    let seed: [u8; 32] = bytes
        .get(..32)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| AdapterError::Config(format!("Orderly secret must be 32 or 64 bytes, got {}", bytes.len())))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// `ed25519:<base58 public key>`.
#[must_use]
pub fn public_key_string(key: &SigningKey) -> String {
    format!("{KEY_PREFIX}{}", bs58::encode(key.verifying_key().to_bytes()).into_string())
}

/// Signs private Orderly requests.
#[derive(Clone)]
pub struct OrderlyAuth {
    account_id: String,
    public_key: String,
    key: SigningKey,
}

impl std::fmt::Debug for OrderlyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderlyAuth")
            .field("account_id", &self.account_id)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl OrderlyAuth {
    /// Build from the account id and an `ed25519:` secret.
    pub fn new(account_id: B256, secret: &str) -> Result<Self, AdapterError> {
        let key = parse_secret(secret)?;
        Ok(Self {
            account_id: account_id.to_string(),
            public_key: public_key_string(&key),
            key,
        })
    }

    /// Public key header value.
    #[must_use]
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Base64url signature of `message`.
    #[must_use]
    pub fn sign(&self, message: &str) -> String {
        URL_SAFE.encode(self.key.sign(message.as_bytes()).to_bytes())
    }

    fn headers_at(&self, timestamp: u64, method: &Method, path_with_query: &str, body: &str) -> Vec<(String, String)> {
        let message = format!("{timestamp}{}{path_with_query}{body}", method.as_str());
        vec![
            ("orderly-timestamp".to_string(), timestamp.to_string()),
            ("orderly-account-id".to_string(), self.account_id.clone()),
            ("orderly-key".to_string(), self.public_key.clone()),
            ("orderly-signature".to_string(), self.sign(&message)),
        ]
    }
}

impl RequestAuth for OrderlyAuth {
    fn headers(&self, method: &Method, path_with_query: &str, body: &str) -> Result<Vec<(String, String)>, AdapterError> {
        Ok(self.headers_at(now_millis(), method, path_with_query, body))
    }
}
