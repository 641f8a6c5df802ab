//! EIP-712 messages for Orderly account actions.
//!
//! Registration, key management and withdrawals are authorized by the wallet
//! on Orderly's off-chain domain. The adapter builds the payloads; the wallet
//! signs them and the caller submits the signature back to Orderly.

use std::borrow::Cow;

use alloy::sol_types::Eip712Domain;
use alloy_primitives::{Address, U256};
use serde_json::json;

use crate::domain::{Eip712Payload, ProtocolId};
use crate::infrastructure::evm::typed_data_payload;

alloy::sol! {
    #![sol(all_derives)]

    struct Registration {
        string brokerId;
        uint256 chainId;
        uint64 timestamp;
        uint256 registrationNonce;
    }

    struct AddOrderlyKey {
        string brokerId;
        uint256 chainId;
        string orderlyKey;
        string scope;
        uint64 timestamp;
        uint64 expiration;
    }

    struct Withdraw {
        string brokerId;
        uint256 chainId;
        address receiver;
        string token;
        uint256 amount;
        uint64 withdrawNonce;
        uint64 timestamp;
    }
}

/// Scope requested for keys added during setup.
pub const KEY_SCOPE: &str = "read,trading";

/// Orderly's off-chain domain for `chain_id`.
#[must_use]
pub fn off_chain_domain(chain_id: u64, verifying_contract: Address) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed("Orderly")),
        Some(Cow::Borrowed("1")),
        Some(U256::from(chain_id)),
        Some(verifying_contract),
        None,
    )
}

/// Account registration payload.
#[must_use]
pub fn registration(domain: &Eip712Domain, broker_id: &str, chain_id: u64, timestamp: u64, nonce: U256) -> Eip712Payload {
    let message = Registration {
        brokerId: broker_id.to_string(),
        chainId: U256::from(chain_id),
        timestamp,
        registrationNonce: nonce,
    };
    let json = json!({
        "brokerId": broker_id,
        "chainId": chain_id,
        "timestamp": timestamp,
        "registrationNonce": nonce.to_string(),
    });
    typed_data_payload(ProtocolId::Orderly, domain, &message, json, "Register Orderly account")
}

/// Payload adding `orderly_key` with `scope` until `expiration` (ms).
#[must_use]
pub fn add_orderly_key(
    domain: &Eip712Domain,
    broker_id: &str,
    chain_id: u64,
    orderly_key: &str,
    timestamp: u64,
    expiration: u64,
) -> Eip712Payload {
    let message = AddOrderlyKey {
        brokerId: broker_id.to_string(),
        chainId: U256::from(chain_id),
        orderlyKey: orderly_key.to_string(),
        scope: KEY_SCOPE.to_string(),
        timestamp,
        expiration,
    };
    let json = json!({
        "brokerId": broker_id,
        "chainId": chain_id,
        "orderlyKey": orderly_key,
        "scope": KEY_SCOPE,
        "timestamp": timestamp,
        "expiration": expiration,
    });
    typed_data_payload(ProtocolId::Orderly, domain, &message, json, "Add Orderly key")
}

/// Withdrawal payload. `amount` is in token units.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn withdraw(
    domain: &Eip712Domain,
    broker_id: &str,
    chain_id: u64,
    receiver: Address,
    token: &str,
    amount: U256,
    nonce: u64,
    timestamp: u64,
) -> Eip712Payload {
    let message = Withdraw {
        brokerId: broker_id.to_string(),
        chainId: U256::from(chain_id),
        receiver,
        token: token.to_string(),
        amount,
        withdrawNonce: nonce,
        timestamp,
    };
    let json = json!({
        "brokerId": broker_id,
        "chainId": chain_id,
        "receiver": receiver.to_checksum(None),
        "token": token,
        "amount": amount.to_string(),
        "withdrawNonce": nonce,
        "timestamp": timestamp,
    });
    typed_data_payload(ProtocolId::Orderly, domain, &message, json, format!("Withdraw {token}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::protocols::orderly::config::OFF_CHAIN_VERIFYING_CONTRACT;
    use alloy::sol_types::SolStruct;

    fn domain() -> Eip712Domain {
        off_chain_domain(42_161, OFF_CHAIN_VERIFYING_CONTRACT)
    }

    #[test]
    fn registration_type_string() {
        assert_eq!(
            Registration::eip712_encode_type(),
            "Registration(string brokerId,uint256 chainId,uint64 timestamp,uint256 registrationNonce)"
        );
    }

    #[test]
    fn add_key_payload_has_scope_and_domain() {
        let payload = add_orderly_key(&domain(), "woofi_pro", 42_161, "ed25519:abc", 1, 2);
        assert_eq!(payload.primary_type, "AddOrderlyKey");
        assert_eq!(payload.message["scope"], "read,trading");
        assert_eq!(payload.domain["name"], "Orderly");
        assert_eq!(payload.domain["chainId"], 42_161);
        assert_eq!(payload.types["AddOrderlyKey"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn withdraw_hash_depends_on_nonce() {
        let a = withdraw(&domain(), "woofi_pro", 42_161, Address::ZERO, "USDC", U256::from(1u8), 1, 5);
        let b = withdraw(&domain(), "woofi_pro", 42_161, Address::ZERO, "USDC", U256::from(1u8), 2, 5);
        assert_ne!(a.signing_hash, b.signing_hash);
        assert_eq!(a.message["amount"], "1");
    }
}
