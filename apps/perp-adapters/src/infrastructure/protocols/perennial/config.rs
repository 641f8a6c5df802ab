//! Perennial v2 adapter configuration.

use alloy_primitives::Address;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Perennial v2 configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerennialConfig {
    /// Enable the adapter.
    #[serde(default)]
    pub enabled: bool,
    /// Key into the `networks` section.
    pub network: String,
    /// MultiInvoker (entry point for position updates and trigger orders).
    pub multi_invoker: Address,
    /// USDC, wrapped into DSU by the MultiInvoker.
    pub usdc: Address,
    /// Markets to expose.
    #[serde(default)]
    pub markets: Vec<PerennialMarketConfig>,
    /// Keeper fee attached to trigger orders, in USDC.
    #[serde(default = "default_trigger_order_fee")]
    pub trigger_order_fee: Decimal,
    /// How many recent MultiInvoker nonces to scan for open trigger orders.
    #[serde(default = "default_order_scan_depth")]
    pub order_scan_depth: u64,
}

/// One Perennial market and its risk parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerennialMarketConfig {
    /// Display symbol (`ETH`).
    pub symbol: String,
    /// Market contract.
    pub address: Address,
    /// Maintenance ratio.
    pub maintenance: Decimal,
    /// Initial margin ratio; max leverage is its inverse.
    pub margin: Decimal,
    /// Maintenance floor in USD.
    #[serde(default)]
    pub min_maintenance: Decimal,
    /// Initial margin floor in USD.
    #[serde(default)]
    pub min_margin: Decimal,
    /// Taker fee as a fraction of notional.
    #[serde(default = "default_taker_fee")]
    pub taker_fee: Decimal,
    /// Maker fee as a fraction of notional.
    #[serde(default)]
    pub maker_fee: Decimal,
}

impl PerennialMarketConfig {
    /// `1 / margin`, zero when margin is unset.
    #[must_use]
    pub fn max_leverage(&self) -> Decimal {
        if self.margin.is_zero() {
            Decimal::ZERO
        } else {
            Decimal::ONE / self.margin
        }
    }
}

const fn default_trigger_order_fee() -> Decimal {
    dec!(0.5)
}

const fn default_order_scan_depth() -> u64 {
    50
}

const fn default_taker_fee() -> Decimal {
    dec!(0.0005)
}
