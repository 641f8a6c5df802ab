//! Account-level state.

use alloy_primitives::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::protocol::ProtocolId;

/// Balance of a single token held with a venue (or in the wallet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    /// Token symbol.
    pub token: String,
    /// Total amount.
    pub amount: Decimal,
    /// Amount locked by open orders or pending withdrawals.
    pub locked: Decimal,
}

impl TokenBalance {
    /// Amount free to use.
    #[must_use]
    pub fn available(&self) -> Decimal {
        (self.amount - self.locked).max(Decimal::ZERO)
    }
}

/// Account summary in the common shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Venue.
    pub protocol: ProtocolId,
    /// Wallet address.
    pub wallet: Address,
    /// Total collateral value in USD.
    pub total_collateral_usd: Decimal,
    /// Collateral not used as margin, in USD.
    pub free_collateral_usd: Decimal,
    /// Margin ratio (collateral / notional), when the venue is cross-margined.
    pub margin_ratio: Option<Decimal>,
    /// Per-token balances.
    pub balances: Vec<TokenBalance>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn available_never_negative() {
        let balance = TokenBalance {
            token: "USDC".to_string(),
            amount: dec!(10),
            locked: dec!(12),
        };
        assert_eq!(balance.available(), Decimal::ZERO);
    }
}
