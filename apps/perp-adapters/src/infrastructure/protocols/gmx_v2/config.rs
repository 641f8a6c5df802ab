//! GMX v2 adapter configuration.

use alloy_primitives::{Address, B256};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// GMX v2 configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmxV2Config {
    /// Enable the adapter.
    #[serde(default)]
    pub enabled: bool,
    /// Key into the `networks` section.
    pub network: String,
    /// GMX REST API (tickers, tokens).
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Contract deployments.
    pub contracts: GmxV2Contracts,
    /// Wrapped native token (WETH on Arbitrum).
    pub wrapped_native_token: Address,
    /// Execution fee estimation.
    #[serde(default)]
    pub execution_fee: ExecutionFeeConfig,
    /// Slippage applied when an order does not carry one.
    #[serde(default = "default_slippage")]
    pub default_slippage: Decimal,
    /// Referral code passed with every order.
    #[serde(default)]
    pub referral_code: B256,
    /// UI fee receiver passed with every order.
    #[serde(default)]
    pub ui_fee_receiver: Address,
    /// Upper bound for `Reader.getMarkets` and account list reads.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Minimum leverage accepted by previews and validation.
    #[serde(default = "default_min_leverage")]
    pub min_leverage: Decimal,
    /// Maximum leverage advertised for every market.
    #[serde(default = "default_max_leverage")]
    pub max_leverage: Decimal,
    /// Minimum position size in USD.
    #[serde(default = "default_min_position_size_usd")]
    pub min_position_size_usd: Decimal,
    /// Minimum collateral in USD.
    #[serde(default = "default_min_collateral_usd")]
    pub min_collateral_usd: Decimal,
    /// Position fee for balance-improving trades.
    #[serde(default = "default_maker_fee")]
    pub maker_fee: Decimal,
    /// Position fee for imbalance-increasing trades.
    #[serde(default = "default_taker_fee")]
    pub taker_fee: Decimal,
}

/// GMX v2 contract addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmxV2Contracts {
    /// DataStore.
    pub data_store: Address,
    /// Reader.
    pub reader: Address,
    /// ExchangeRouter (order entry point).
    pub exchange_router: Address,
    /// Router (ERC-20 approval spender).
    pub router: Address,
    /// OrderVault (receives collateral and execution fee).
    pub order_vault: Address,
}

/// Execution fee estimation: `gas_limit * gas_price * multiplier`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionFeeConfig {
    /// Gas limit for increase orders.
    #[serde(default = "default_increase_gas_limit")]
    pub increase_gas_limit: u64,
    /// Gas limit for decrease orders.
    #[serde(default = "default_decrease_gas_limit")]
    pub decrease_gas_limit: u64,
    /// Buffer over the current gas price.
    #[serde(default = "default_fee_multiplier")]
    pub multiplier: Decimal,
}

impl Default for ExecutionFeeConfig {
    fn default() -> Self {
        Self {
            increase_gas_limit: default_increase_gas_limit(),
            decrease_gas_limit: default_decrease_gas_limit(),
            multiplier: default_fee_multiplier(),
        }
    }
}

fn default_api_url() -> String {
    "https://arbitrum-api.gmxinfra.io".to_string()
}

const fn default_slippage() -> Decimal {
    dec!(0.005)
}

const fn default_max_entries() -> u64 {
    200
}

const fn default_min_leverage() -> Decimal {
    dec!(1.1)
}

const fn default_max_leverage() -> Decimal {
    dec!(100)
}

const fn default_min_position_size_usd() -> Decimal {
    dec!(2)
}

const fn default_min_collateral_usd() -> Decimal {
    dec!(1)
}

const fn default_maker_fee() -> Decimal {
    dec!(0.0005)
}

const fn default_taker_fee() -> Decimal {
    dec!(0.0007)
}

const fn default_increase_gas_limit() -> u64 {
    4_000_000
}

const fn default_decrease_gas_limit() -> u64 {
    4_000_000
}

const fn default_fee_multiplier() -> Decimal {
    dec!(1.3)
}
