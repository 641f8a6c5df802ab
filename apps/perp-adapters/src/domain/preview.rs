//! Trade previews: projected position state before submitting.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::Side;
use super::protocol::MarketId;

/// Projected result of an open / increase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTradePreview {
    /// Market.
    pub market_id: MarketId,
    /// Side.
    pub side: Side,
    /// Resulting size in index tokens.
    pub size_tokens: Decimal,
    /// Resulting size in USD.
    pub size_usd: Decimal,
    /// Resulting margin in USD.
    pub margin_usd: Decimal,
    /// Resulting leverage.
    pub leverage: Decimal,
    /// Resulting average entry price.
    pub avg_entry_price: Decimal,
    /// Estimated liquidation price.
    pub liquidation_price: Option<Decimal>,
    /// Estimated trading fee in USD.
    pub fee_usd: Decimal,
    /// Whether the order passes venue limits.
    pub is_valid: bool,
    /// Reason the order would be rejected.
    pub error_message: Option<String>,
}

impl OpenTradePreview {
    /// Mark the preview invalid with a reason.
    #[must_use]
    pub fn invalid(mut self, reason: impl Into<String>) -> Self {
        self.is_valid = false;
        self.error_message = Some(reason.into());
        self
    }
}

/// Projected result of a close / decrease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseTradePreview {
    /// Market.
    pub market_id: MarketId,
    /// Side of the position being reduced.
    pub side: Side,
    /// Remaining size in index tokens.
    pub remaining_size_tokens: Decimal,
    /// Remaining margin in USD.
    pub remaining_margin_usd: Decimal,
    /// Leverage after the close.
    pub leverage: Decimal,
    /// Liquidation price after the close, `None` when fully closed.
    pub liquidation_price: Option<Decimal>,
    /// PnL realized by this close.
    pub realized_pnl: Decimal,
    /// Collateral returned to the trader in USD.
    pub received_margin_usd: Decimal,
    /// Estimated trading fee in USD.
    pub fee_usd: Decimal,
    /// Whether the close passes venue limits.
    pub is_valid: bool,
    /// Reason the close would be rejected.
    pub error_message: Option<String>,
}

/// Projected result of a margin update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginPreview {
    /// Market.
    pub market_id: MarketId,
    /// Margin after the update in USD.
    pub margin_usd: Decimal,
    /// Leverage after the update.
    pub leverage: Decimal,
    /// Liquidation price after the update.
    pub liquidation_price: Option<Decimal>,
    /// Whether the update is allowed.
    pub is_valid: bool,
    /// Reason the update would be rejected.
    pub error_message: Option<String>,
}
