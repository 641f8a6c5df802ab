//! Aevo order signing.
//!
//! Orders are EIP-712 `Order` structs signed by the account's registered
//! signing key. Prices and amounts are 6-decimal fixed point.

use std::borrow::Cow;

use alloy::sol_types::Eip712Domain;
use alloy_primitives::{Address, U256};

use crate::error::AdapterError;
use crate::infrastructure::evm::LocalSigner;

alloy::sol! {
    #![sol(all_derives)]

    struct Order {
        address maker;
        bool isBuy;
        uint256 limitPrice;
        uint256 amount;
        uint256 salt;
        uint256 instrument;
        uint256 timestamp;
    }
}

/// Fixed-point decimals of `limitPrice` and `amount`.
pub const ORDER_DECIMALS: u8 = 6;

/// Order domain: `Aevo Mainnet` on chain 1 or `Aevo Testnet` on Sepolia.
#[must_use]
pub fn order_domain(testnet: bool) -> Eip712Domain {
    let (name, chain_id) = if testnet {
        ("Aevo Testnet", 11_155_111u64)
    } else {
        ("Aevo Mainnet", 1u64)
    };
    Eip712Domain::new(
        Some(Cow::Borrowed(name)),
        Some(Cow::Borrowed("1")),
        Some(U256::from(chain_id)),
        None,
        None,
    )
}

/// Order fields before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderParams {
    /// Account address.
    pub maker: Address,
    /// Buy or sell.
    pub is_buy: bool,
    /// Limit price, 6 decimals.
    pub limit_price: U256,
    /// Amount, 6 decimals.
    pub amount: U256,
    /// Random salt.
    pub salt: U256,
    /// Numeric instrument id.
    pub instrument: U256,
    /// Unix seconds.
    pub timestamp: u64,
}

impl OrderParams {
    fn to_struct(&self) -> Order {
        Order {
            maker: self.maker,
            isBuy: self.is_buy,
            limitPrice: self.limit_price,
            amount: self.amount,
            salt: self.salt,
            instrument: self.instrument,
            timestamp: U256::from(self.timestamp),
        }
    }

    /// Sign under `domain`. Returns `0x` + 65-byte hex.
    pub fn sign(&self, signer: &LocalSigner, domain: &Eip712Domain) -> Result<String, AdapterError> {
        signer.sign_typed(&self.to_struct(), domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolStruct;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn params() -> OrderParams {
        OrderParams {
            maker: Address::repeat_byte(0x42),
            is_buy: true,
            limit_price: U256::from(2_000_000_000u64),
            amount: U256::from(500_000u64),
            salt: U256::from(7u8),
            instrument: U256::from(1u8),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn order_type_string() {
        assert_eq!(
            Order::eip712_encode_type(),
            "Order(address maker,bool isBuy,uint256 limitPrice,uint256 amount,uint256 salt,uint256 instrument,uint256 timestamp)"
        );
    }

    #[test]
    fn domains_differ_by_network() {
        let order = params().to_struct();
        assert_ne!(
            order.eip712_signing_hash(&order_domain(true)),
            order.eip712_signing_hash(&order_domain(false))
        );
        assert_eq!(order_domain(false).chain_id, Some(U256::from(1u8)));
    }

    #[test]
    fn signature_changes_with_salt() {
        let signer = LocalSigner::from_hex(KEY).unwrap();
        let domain = order_domain(false);
        let a = params().sign(&signer, &domain).unwrap();
        let b = OrderParams { salt: U256::from(8u8), ..params() }.sign(&signer, &domain).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 132);
    }
}
