//! What a write operation hands back to the caller.
//!
//! On-chain venues produce unsigned transactions for the wallet to send.
//! Venues that authorize account actions with wallet signatures produce
//! EIP-712 payloads. Venues whose API the adapter calls directly return an
//! acknowledgement.

use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

use super::protocol::{Chain, ProtocolId};

/// A transaction for the wallet to sign and broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTx {
    /// Chain to send on.
    pub chain: Chain,
    /// Contract to call.
    pub to: Address,
    /// ABI-encoded calldata.
    pub data: Bytes,
    /// Native value to attach (wei).
    pub value: U256,
    /// Short label, e.g. "Approve USDC".
    pub heading: String,
    /// Longer human-readable description.
    pub description: String,
}

/// EIP-712 typed data awaiting a wallet signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eip712Payload {
    /// Venue that will consume the signature.
    pub protocol: ProtocolId,
    /// `EIP712Domain` as JSON.
    pub domain: serde_json::Value,
    /// Type definitions as JSON (`{"Registration": [{"name":..,"type":..}]}`).
    pub types: serde_json::Value,
    /// Primary type name.
    pub primary_type: String,
    /// Message as JSON.
    pub message: serde_json::Value,
    /// Final digest to sign (`keccak256(0x1901 ‖ domainSeparator ‖ structHash)`).
    pub signing_hash: B256,
    /// Short label.
    pub heading: String,
}

/// Output of a write operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouterOutput {
    /// Transaction to broadcast.
    Transaction(UnsignedTx),
    /// Typed data to sign and submit back to the venue.
    TypedData(Eip712Payload),
    /// The venue accepted the request.
    ApiAck {
        /// Venue.
        protocol: ProtocolId,
        /// Venue reference (order id, request id).
        reference: String,
        /// Venue message.
        message: String,
    },
}

impl RouterOutput {
    /// Borrow the transaction, if this is one.
    #[must_use]
    pub const fn as_transaction(&self) -> Option<&UnsignedTx> {
        match self {
            Self::Transaction(tx) => Some(tx),
            _ => None,
        }
    }

    /// Short label for logs.
    #[must_use]
    pub fn heading(&self) -> &str {
        match self {
            Self::Transaction(tx) => &tx.heading,
            Self::TypedData(payload) => &payload.heading,
            Self::ApiAck { reference, .. } => reference,
        }
    }
}
