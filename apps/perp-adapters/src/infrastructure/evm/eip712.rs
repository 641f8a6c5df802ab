//! EIP-712 payload construction and local signing.

use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::{Eip712Domain, SolStruct};
use alloy_primitives::{Address, B256, hex};
use serde_json::{Map, Value, json};

use crate::domain::{Eip712Payload, ProtocolId};
use crate::error::AdapterError;

/// Build a wallet-signable payload for `message`.
///
/// `message_json` is the JSON form of `message` as the venue expects it back
/// (field names must match the struct definition).
pub fn typed_data_payload<T: SolStruct>(
    protocol: ProtocolId,
    domain: &Eip712Domain,
    message: &T,
    message_json: Value,
    heading: impl Into<String>,
) -> Eip712Payload {
    let (domain_json, domain_fields) = domain_to_json(domain);
    let mut types = parse_encode_type(&T::eip712_encode_type());
    types.insert("EIP712Domain".to_string(), Value::Array(domain_fields));

    Eip712Payload {
        protocol,
        domain: domain_json,
        types: Value::Object(types),
        primary_type: T::NAME.to_string(),
        message: message_json,
        signing_hash: message.eip712_signing_hash(domain),
        heading: heading.into(),
    }
}

fn domain_to_json(domain: &Eip712Domain) -> (Value, Vec<Value>) {
    let mut values = Map::new();
    let mut fields = Vec::new();
    if let Some(name) = &domain.name {
        values.insert("name".into(), json!(name));
        fields.push(json!({"name": "name", "type": "string"}));
    }
    if let Some(version) = &domain.version {
        values.insert("version".into(), json!(version));
        fields.push(json!({"name": "version", "type": "string"}));
    }
    if let Some(chain_id) = domain.chain_id {
        let value = u64::try_from(chain_id).map_or_else(|_| json!(chain_id.to_string()), |id| json!(id));
        values.insert("chainId".into(), value);
        fields.push(json!({"name": "chainId", "type": "uint256"}));
    }
    if let Some(contract) = domain.verifying_contract {
        values.insert("verifyingContract".into(), json!(contract.to_checksum(None)));
        fields.push(json!({"name": "verifyingContract", "type": "address"}));
    }
    if let Some(salt) = domain.salt {
        values.insert("salt".into(), json!(salt));
        fields.push(json!({"name": "salt", "type": "bytes32"}));
    }
    (Value::Object(values), fields)
}

/// Turn `Name(type a,type b)Other(...)` into the `types` JSON map.
fn parse_encode_type(encoded: &str) -> Map<String, Value> {
    let mut types = Map::new();
    let mut rest = encoded;
    while let Some(open) = rest.find('(') {
        let Some(close) = rest[open..].find(')').map(|c| open + c) else {
            break;
        };
        let fields = rest[open + 1..close]
            .split(',')
            .filter_map(|field| field.split_once(' '))
            .map(|(ty, name)| json!({"name": name, "type": ty}))
            .collect();
        types.insert(rest[..open].to_string(), Value::Array(fields));
        rest = &rest[close + 1..];
    }
    types
}

/// Local secp256k1 signer for venues that take order signatures in requests.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    inner: PrivateKeySigner,
}

impl LocalSigner {
    /// Parse a hex private key (with or without `0x`).
    pub fn from_hex(key: &str) -> Result<Self, AdapterError> {
        let inner = key
            .trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| AdapterError::Config(format!("invalid signing key: {e}")))?;
        Ok(Self { inner })
    }

    /// Signer address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.inner.address()
    }

    /// Sign a 32-byte digest. Returns `0x` + 65-byte `r‖s‖v` hex.
    pub fn sign_hash(&self, hash: &B256) -> Result<String, AdapterError> {
        let signature = self.inner.sign_hash_sync(hash)?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }

    /// Sign an EIP-712 struct under `domain`.
    pub fn sign_typed<T: SolStruct>(&self, message: &T, domain: &Eip712Domain) -> Result<String, AdapterError> {
        self.sign_hash(&message.eip712_signing_hash(domain))
    }
}
