//! Aevo adapter configuration.

use alloy_primitives::Address;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Aevo configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AevoConfig {
    /// Enable the adapter.
    #[serde(default)]
    pub enabled: bool,
    /// REST base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Sign orders on the testnet domain.
    #[serde(default)]
    pub testnet: bool,
    /// Account (order maker) address.
    pub wallet_address: Address,
    /// API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// API secret for request HMACs.
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Hex private key of the registered signing key.
    #[serde(default)]
    pub signing_key: Option<String>,
    /// Maker fee rate.
    #[serde(default = "default_maker_fee")]
    pub maker_fee: Decimal,
    /// Taker fee rate.
    #[serde(default = "default_taker_fee")]
    pub taker_fee: Decimal,
    /// Leverage cap when the venue does not report one.
    #[serde(default = "default_max_leverage")]
    pub default_max_leverage: Decimal,
}

impl AevoConfig {
    /// Chain id of the order signing domain.
    #[must_use]
    pub const fn domain_chain_id(&self) -> u64 {
        if self.testnet { 11_155_111 } else { 1 }
    }
}

fn default_base_url() -> String {
    "https://api.aevo.xyz".to_string()
}

const fn default_maker_fee() -> Decimal {
    dec!(0.0005)
}

const fn default_taker_fee() -> Decimal {
    dec!(0.0008)
}

const fn default_max_leverage() -> Decimal {
    dec!(20)
}
