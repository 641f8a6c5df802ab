//! Orderly adapter configuration.

use alloy_primitives::{Address, address};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Verifying contract of Orderly's off-chain EIP-712 domain.
pub const OFF_CHAIN_VERIFYING_CONTRACT: Address = address!("CcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC");

/// Orderly configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderlyConfig {
    /// Enable the adapter.
    #[serde(default)]
    pub enabled: bool,
    /// Key into the `networks` section (vault chain and EIP-712 chain id).
    pub network: String,
    /// REST base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Broker the account is registered under.
    #[serde(default = "default_broker_id")]
    pub broker_id: String,
    /// Wallet that owns the Orderly account.
    pub account_address: Address,
    /// Orderly key secret, `ed25519:<base58>`. Required for account endpoints.
    #[serde(default)]
    pub orderly_secret: Option<String>,
    /// Vault contract on the configured network.
    pub vault: Address,
    /// USDC on the configured network.
    pub usdc: Address,
    /// Verifying contract of the off-chain domain.
    #[serde(default = "default_verifying_contract")]
    pub verifying_contract: Address,
    /// Lifetime of keys added during setup.
    #[serde(default = "default_key_expiration_days")]
    pub key_expiration_days: i64,
    /// Maker fee rate.
    #[serde(default = "default_maker_fee")]
    pub maker_fee: Decimal,
    /// Taker fee rate.
    #[serde(default = "default_taker_fee")]
    pub taker_fee: Decimal,
}

fn default_base_url() -> String {
    "https://api-evm.orderly.org".to_string()
}

fn default_broker_id() -> String {
    "woofi_pro".to_string()
}

const fn default_verifying_contract() -> Address {
    OFF_CHAIN_VERIFYING_CONTRACT
}

const fn default_key_expiration_days() -> i64 {
    365
}

const fn default_maker_fee() -> Decimal {
    dec!(0.0002)
}

const fn default_taker_fee() -> Decimal {
    dec!(0.0005)
}
