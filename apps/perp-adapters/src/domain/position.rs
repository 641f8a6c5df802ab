//! Positions and position-modifying requests.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::{OrderType, Side};
use super::protocol::MarketId;

/// Open position in the common shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    /// Venue position key (GMX position key, market address, symbol).
    pub position_id: String,
    /// Market of the position.
    pub market_id: MarketId,
    /// Direction.
    pub side: Side,
    /// Size in index tokens.
    pub size_tokens: Decimal,
    /// Size in USD at entry.
    pub size_usd: Decimal,
    /// Margin (collateral value) in USD.
    pub margin_usd: Decimal,
    /// Average entry price.
    pub avg_entry_price: Decimal,
    /// Current mark price.
    pub mark_price: Decimal,
    /// Effective leverage.
    pub leverage: Decimal,
    /// Estimated liquidation price, if the venue reports or allows computing one.
    pub liquidation_price: Option<Decimal>,
    /// Unrealized PnL in USD.
    pub unrealized_pnl: Decimal,
    /// Accrued funding in USD (positive: owed by the position).
    pub accrued_funding: Decimal,
    /// Accrued borrowing fees in USD.
    pub accrued_borrowing: Decimal,
    /// Collateral token symbol.
    pub collateral_token: String,
}

impl PositionInfo {
    /// Current notional value at the mark price.
    #[must_use]
    pub fn notional_usd(&self) -> Decimal {
        self.size_tokens * self.mark_price
    }
}

/// Unrealized PnL of `size_tokens` entered at `entry` and marked at `mark`.
#[must_use]
pub fn unrealized_pnl(side: Side, size_tokens: Decimal, entry: Decimal, mark: Decimal) -> Decimal {
    side.sign() * size_tokens * (mark - entry)
}

/// Request to reduce or close a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosePosition {
    /// Size to close in index tokens.
    pub close_size: Decimal,
    /// Order type (market, limit, stop loss, take profit).
    pub order_type: OrderType,
    /// Trigger price for non-market closes.
    pub trigger_price: Option<Decimal>,
    /// Slippage for the acceptable price.
    pub slippage: Decimal,
    /// Token to receive, when the venue can swap collateral on close.
    pub output_token: Option<String>,
}

impl ClosePosition {
    /// Market close of `size` tokens.
    #[must_use]
    pub const fn market(size: Decimal, slippage: Decimal) -> Self {
        Self {
            close_size: size,
            order_type: OrderType::Market,
            trigger_price: None,
            slippage,
            output_token: None,
        }
    }

    /// Whether this close takes the whole position.
    #[must_use]
    pub fn is_full_close(&self, position: &PositionInfo) -> bool {
        self.close_size >= position.size_tokens
    }
}

/// Request to add or remove margin without changing size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePositionMargin {
    /// Margin amount in collateral token units.
    pub margin_delta: Decimal,
    /// `true` to deposit, `false` to withdraw.
    pub is_deposit: bool,
    /// Collateral token symbol.
    pub collateral_token: String,
}

impl UpdatePositionMargin {
    /// Signed margin change.
    #[must_use]
    pub fn signed_delta(&self) -> Decimal {
        if self.is_deposit {
            self.margin_delta
        } else {
            -self.margin_delta
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test_case(Side::Long, dec!(2000), dec!(2200), dec!(200) ; "long profits on rise")]
    #[test_case(Side::Long, dec!(2000), dec!(1900), dec!(-100) ; "long loses on fall")]
    #[test_case(Side::Short, dec!(2000), dec!(1900), dec!(100) ; "short profits on fall")]
    #[test_case(Side::Short, dec!(2000), dec!(2100), dec!(-100) ; "short loses on rise")]
    fn pnl_by_side(side: Side, entry: Decimal, mark: Decimal, expected: Decimal) {
        assert_eq!(unrealized_pnl(side, dec!(1), entry, mark), expected);
    }

    #[test]
    fn margin_delta_sign_follows_direction() {
        let withdraw = UpdatePositionMargin {
            margin_delta: dec!(25),
            is_deposit: false,
            collateral_token: "USDC".to_string(),
        };
        assert_eq!(withdraw.signed_delta(), dec!(-25));
    }
}
