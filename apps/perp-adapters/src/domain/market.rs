//! Market metadata and live market state.

use alloy_primitives::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::protocol::{Chain, MarketId, ProtocolId};

/// A token as seen by a venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Ticker symbol.
    pub symbol: String,
    /// Contract address; `None` for off-chain settlement assets.
    pub address: Option<Address>,
    /// Token decimals.
    pub decimals: u8,
}

impl TokenInfo {
    /// Off-chain asset (order-book venues quote in symbols only).
    #[must_use]
    pub fn off_chain(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            address: None,
            decimals,
        }
    }

    /// On-chain ERC-20.
    #[must_use]
    pub fn erc20(symbol: impl Into<String>, address: Address, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            address: Some(address),
            decimals,
        }
    }
}

/// Static market metadata in the common shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInfo {
    /// Global market id.
    pub market_id: MarketId,
    /// Owning protocol.
    pub protocol: ProtocolId,
    /// Chain the market settles on.
    pub chain: Chain,
    /// Asset being traded.
    pub index_token: TokenInfo,
    /// Collateral accepted for longs.
    pub long_collateral: Vec<TokenInfo>,
    /// Collateral accepted for shorts.
    pub short_collateral: Vec<TokenInfo>,
    /// Minimum leverage.
    pub min_leverage: Decimal,
    /// Maximum leverage.
    pub max_leverage: Decimal,
    /// Minimum initial margin in USD.
    pub min_initial_margin_usd: Decimal,
    /// Minimum position notional in USD.
    pub min_position_size_usd: Decimal,
    /// Maker fee as a fraction of notional.
    pub maker_fee: Decimal,
    /// Taker fee as a fraction of notional.
    pub taker_fee: Decimal,
    /// Price tick.
    pub price_precision: Decimal,
    /// Size step.
    pub size_precision: Decimal,
    /// Whether limit / trigger orders are accepted.
    pub supports_limit_orders: bool,
    /// Whether positions can be partially closed.
    pub supports_partial_close: bool,
}

impl MarketInfo {
    /// Whether the market accepts `token` as collateral for the given side.
    #[must_use]
    pub fn accepts_collateral(&self, symbol: &str, is_long: bool) -> bool {
        let pool = if is_long {
            &self.long_collateral
        } else {
            &self.short_collateral
        };
        pool.iter().any(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }
}

/// Live market state. Rates are expressed per hour as fractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    /// Global market id.
    pub market_id: MarketId,
    /// Mark / oracle price.
    pub price: Decimal,
    /// Long open interest in USD.
    pub long_open_interest_usd: Decimal,
    /// Short open interest in USD.
    pub short_open_interest_usd: Decimal,
    /// Funding rate paid by longs (negative: longs receive).
    pub long_funding_rate: Decimal,
    /// Funding rate paid by shorts (negative: shorts receive).
    pub short_funding_rate: Decimal,
    /// Borrow rate paid by longs.
    pub long_borrow_rate: Decimal,
    /// Borrow rate paid by shorts.
    pub short_borrow_rate: Decimal,
    /// Remaining capacity in USD, if the venue caps open interest.
    pub available_liquidity_usd: Option<Decimal>,
}

impl MarketState {
    /// Net open interest skew (long minus short).
    #[must_use]
    pub fn skew_usd(&self) -> Decimal {
        self.long_open_interest_usd - self.short_open_interest_usd
    }
}
