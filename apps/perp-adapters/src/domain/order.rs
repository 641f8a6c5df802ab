//! Order requests and open-order snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::protocol::MarketId;

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    /// Profits when price rises.
    Long,
    /// Profits when price falls.
    Short,
}

impl Side {
    /// `true` for [`Side::Long`].
    #[must_use]
    pub const fn is_long(&self) -> bool {
        matches!(self, Self::Long)
    }

    /// The other side.
    #[must_use]
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// +1 for long, -1 for short.
    #[must_use]
    pub const fn sign(&self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Execute immediately at the best available price within slippage.
    Market,
    /// Execute at the trigger price or better.
    Limit,
    /// Reduce when price moves against the position.
    StopLoss,
    /// Reduce when price moves in favour of the position.
    TakeProfit,
}

impl OrderType {
    /// Whether a trigger price is mandatory.
    #[must_use]
    pub const fn requires_trigger(&self) -> bool {
        !matches!(self, Self::Market)
    }
}

/// Request to open or increase a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrder {
    /// Target market.
    pub market_id: MarketId,
    /// Direction.
    pub side: Side,
    /// Order type.
    pub order_type: OrderType,
    /// Size to add, in USD when `size_in_usd`, else in index tokens.
    pub size_delta: Decimal,
    /// Unit of `size_delta`.
    pub size_in_usd: bool,
    /// Collateral to deposit alongside the order, in collateral token units.
    pub margin_delta: Decimal,
    /// Collateral token symbol.
    pub collateral_token: String,
    /// Trigger / limit price.
    pub trigger_price: Option<Decimal>,
    /// Maximum acceptable slippage as a fraction (0.01 = 1%).
    pub slippage: Decimal,
    /// Only reduce an existing position.
    pub reduce_only: bool,
}

impl CreateOrder {
    /// Market order sized in USD.
    #[must_use]
    pub fn market(
        market_id: MarketId,
        side: Side,
        size_usd: Decimal,
        margin: Decimal,
        collateral_token: impl Into<String>,
    ) -> Self {
        Self {
            market_id,
            side,
            order_type: OrderType::Market,
            size_delta: size_usd,
            size_in_usd: true,
            margin_delta: margin,
            collateral_token: collateral_token.into(),
            trigger_price: None,
            slippage: Decimal::new(1, 2),
            reduce_only: false,
        }
    }

    /// Limit order sized in USD.
    #[must_use]
    pub fn limit(
        market_id: MarketId,
        side: Side,
        size_usd: Decimal,
        margin: Decimal,
        collateral_token: impl Into<String>,
        price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            trigger_price: Some(price),
            ..Self::market(market_id, side, size_usd, margin, collateral_token)
        }
    }

    /// Set slippage.
    #[must_use]
    pub const fn with_slippage(mut self, slippage: Decimal) -> Self {
        self.slippage = slippage;
        self
    }

    /// Express the order size in index tokens instead of USD.
    #[must_use]
    pub const fn sized_in_tokens(mut self) -> Self {
        self.size_in_usd = false;
        self
    }

    /// Size in USD at the given price.
    #[must_use]
    pub fn size_usd_at(&self, price: Decimal) -> Decimal {
        if self.size_in_usd {
            self.size_delta
        } else {
            self.size_delta * price
        }
    }

    /// Size in index tokens at the given price. Zero when the price is zero.
    #[must_use]
    pub fn size_tokens_at(&self, price: Decimal) -> Decimal {
        if !self.size_in_usd {
            self.size_delta
        } else if price.is_zero() {
            Decimal::ZERO
        } else {
            self.size_delta / price
        }
    }
}

/// Request to modify a resting order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOrder {
    /// Venue order id.
    pub order_id: String,
    /// Market of the order.
    pub market_id: MarketId,
    /// Direction of the order.
    pub side: Side,
    /// Order type.
    pub order_type: OrderType,
    /// New size (same unit rules as [`CreateOrder`]).
    pub size_delta: Decimal,
    /// Unit of `size_delta`.
    pub size_in_usd: bool,
    /// New trigger price.
    pub trigger_price: Decimal,
    /// Slippage for the acceptable price.
    pub slippage: Decimal,
}

/// Request to cancel a resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    /// Venue order id.
    pub order_id: String,
    /// Market of the order.
    pub market_id: MarketId,
}

/// Lifecycle state of an open order as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted, not yet filled.
    Open,
    /// Partially filled.
    PartiallyFilled,
    /// Waiting for a keeper or trigger.
    Pending,
}

/// Open order in the common shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
    /// Venue order id (GMX order key, Perennial nonce, REST order id).
    pub order_id: String,
    /// Market of the order.
    pub market_id: MarketId,
    /// Direction.
    pub side: Side,
    /// Order type.
    pub order_type: OrderType,
    /// Remaining size in index tokens.
    pub size_tokens: Decimal,
    /// Remaining size in USD.
    pub size_usd: Decimal,
    /// Trigger / limit price.
    pub trigger_price: Option<Decimal>,
    /// Collateral attached to the order.
    pub margin_delta: Decimal,
    /// Reduce-only flag.
    pub reduce_only: bool,
    /// Status.
    pub status: OrderStatus,
    /// Creation time, when the venue reports it.
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::protocol::{Chain, ProtocolId};
    use rust_decimal_macros::dec;

    fn market() -> MarketId {
        MarketId::new(Chain::ARBITRUM, ProtocolId::Orderly, "PERP_BTC_USDC")
    }

    #[test]
    fn usd_sized_order_converts_to_tokens() {
        let order = CreateOrder::market(market(), Side::Long, dec!(1000), dec!(100), "USDC");
        assert_eq!(order.size_tokens_at(dec!(50000)), dec!(0.02));
        assert_eq!(order.size_usd_at(dec!(50000)), dec!(1000));
    }

    #[test]
    fn token_sized_order_converts_to_usd() {
        let order = CreateOrder::market(market(), Side::Short, dec!(0.5), dec!(100), "USDC")
            .sized_in_tokens();
        assert_eq!(order.size_usd_at(dec!(60000)), dec!(30000));
        assert_eq!(order.size_tokens_at(dec!(60000)), dec!(0.5));
    }

    #[test]
    fn zero_price_yields_zero_tokens() {
        let order = CreateOrder::market(market(), Side::Long, dec!(1000), dec!(100), "USDC");
        assert_eq!(order.size_tokens_at(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn limit_order_carries_trigger() {
        let order = CreateOrder::limit(
            market(),
            Side::Long,
            dec!(1000),
            dec!(100),
            "USDC",
            dec!(42000),
        );
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.trigger_price, Some(dec!(42000)));
        assert!(order.order_type.requires_trigger());
        assert!(!OrderType::Market.requires_trigger());
    }

    #[test]
    fn side_helpers() {
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert_eq!(Side::Short.sign(), Decimal::NEGATIVE_ONE);
        assert_eq!(Side::Long.to_string(), "LONG");
    }
}
