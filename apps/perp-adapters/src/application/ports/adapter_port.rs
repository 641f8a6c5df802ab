//! Perps Adapter Port (Driven Port)
//!
//! The common interface every venue adapter implements. Operations a venue
//! does not support keep the default body, which fails with
//! [`AdapterError::NotImplemented`].

use alloy_primitives::Address;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{
    AccountInfo, CancelOrder, Chain, ClosePosition, CloseTradePreview, CreateOrder, MarginPreview,
    MarketId, MarketInfo, MarketState, OpenTradePreview, OrderInfo, PositionInfo, ProtocolId,
    RouterOutput, UpdateOrder, UpdatePositionMargin,
};
use crate::error::AdapterError;

/// Result alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Port for a single perpetuals venue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PerpsAdapter: Send + Sync {
    /// Venue identity.
    fn protocol_id(&self) -> ProtocolId;

    /// Chains the adapter is configured for.
    fn supported_chains(&self) -> Vec<Chain>;

    /// One-time account setup (approvals, registration, key delegation).
    async fn setup(&self, _wallet: Address) -> AdapterResult<Vec<RouterOutput>> {
        Err(AdapterError::not_implemented(self.protocol_id(), "setup"))
    }

    /// All tradable markets.
    async fn get_all_markets(&self) -> AdapterResult<Vec<MarketInfo>> {
        Err(AdapterError::not_implemented(
            self.protocol_id(),
            "get_all_markets",
        ))
    }

    /// Current prices, in the order of `market_ids`.
    async fn get_market_prices(&self, _market_ids: &[MarketId]) -> AdapterResult<Vec<Decimal>> {
        Err(AdapterError::not_implemented(
            self.protocol_id(),
            "get_market_prices",
        ))
    }

    /// Open interest, funding and borrow rates, in the order of `market_ids`.
    async fn get_markets_state(&self, _market_ids: &[MarketId]) -> AdapterResult<Vec<MarketState>> {
        Err(AdapterError::not_implemented(
            self.protocol_id(),
            "get_markets_state",
        ))
    }

    /// Open or increase positions.
    async fn create_order(
        &self,
        _wallet: Address,
        _orders: &[CreateOrder],
    ) -> AdapterResult<Vec<RouterOutput>> {
        Err(AdapterError::not_implemented(self.protocol_id(), "create_order"))
    }

    /// Modify resting orders.
    async fn update_order(
        &self,
        _wallet: Address,
        _orders: &[UpdateOrder],
    ) -> AdapterResult<Vec<RouterOutput>> {
        Err(AdapterError::not_implemented(self.protocol_id(), "update_order"))
    }

    /// Cancel resting orders.
    async fn cancel_order(
        &self,
        _wallet: Address,
        _orders: &[CancelOrder],
    ) -> AdapterResult<Vec<RouterOutput>> {
        Err(AdapterError::not_implemented(self.protocol_id(), "cancel_order"))
    }

    /// Reduce or close positions. `positions` and `closes` are paired by index.
    async fn close_position(
        &self,
        _wallet: Address,
        _positions: &[PositionInfo],
        _closes: &[ClosePosition],
    ) -> AdapterResult<Vec<RouterOutput>> {
        Err(AdapterError::not_implemented(
            self.protocol_id(),
            "close_position",
        ))
    }

    /// Add or remove margin. `positions` and `updates` are paired by index.
    async fn update_position_margin(
        &self,
        _wallet: Address,
        _positions: &[PositionInfo],
        _updates: &[UpdatePositionMargin],
    ) -> AdapterResult<Vec<RouterOutput>> {
        Err(AdapterError::not_implemented(
            self.protocol_id(),
            "update_position_margin",
        ))
    }

    /// All open positions of `wallet`.
    async fn get_all_positions(&self, _wallet: Address) -> AdapterResult<Vec<PositionInfo>> {
        Err(AdapterError::not_implemented(
            self.protocol_id(),
            "get_all_positions",
        ))
    }

    /// All resting orders of `wallet`.
    async fn get_all_orders(&self, _wallet: Address) -> AdapterResult<Vec<OrderInfo>> {
        Err(AdapterError::not_implemented(
            self.protocol_id(),
            "get_all_orders",
        ))
    }

    /// Account summary of `wallet`.
    async fn get_account_info(&self, _wallet: Address) -> AdapterResult<AccountInfo> {
        Err(AdapterError::not_implemented(
            self.protocol_id(),
            "get_account_info",
        ))
    }

    /// Preview opening orders. `existing` holds the current position per
    /// order (paired by index), if any.
    async fn get_open_trade_preview(
        &self,
        _wallet: Address,
        _orders: &[CreateOrder],
        _existing: &[Option<PositionInfo>],
    ) -> AdapterResult<Vec<OpenTradePreview>> {
        Err(AdapterError::not_implemented(
            self.protocol_id(),
            "get_open_trade_preview",
        ))
    }

    /// Preview closes. `positions` and `closes` are paired by index.
    async fn get_close_trade_preview(
        &self,
        _wallet: Address,
        _positions: &[PositionInfo],
        _closes: &[ClosePosition],
    ) -> AdapterResult<Vec<CloseTradePreview>> {
        Err(AdapterError::not_implemented(
            self.protocol_id(),
            "get_close_trade_preview",
        ))
    }

    /// Preview margin updates. `positions` and `updates` are paired by index.
    async fn get_update_margin_preview(
        &self,
        _wallet: Address,
        _positions: &[PositionInfo],
        _updates: &[UpdatePositionMargin],
    ) -> AdapterResult<Vec<MarginPreview>> {
        Err(AdapterError::not_implemented(
            self.protocol_id(),
            "get_update_margin_preview",
        ))
    }

    /// Move funds from the wallet into the venue.
    async fn deposit(
        &self,
        _wallet: Address,
        _token: &str,
        _amount: Decimal,
    ) -> AdapterResult<Vec<RouterOutput>> {
        Err(AdapterError::not_implemented(self.protocol_id(), "deposit"))
    }

    /// Move funds from the venue back to the wallet.
    async fn withdraw(
        &self,
        _wallet: Address,
        _token: &str,
        _amount: Decimal,
    ) -> AdapterResult<Vec<RouterOutput>> {
        Err(AdapterError::not_implemented(self.protocol_id(), "withdraw"))
    }
}

/// Check that paired slices have equal length.
pub fn ensure_paired<A, B>(left: &[A], right: &[B], what: &str) -> AdapterResult<()> {
    if left.len() == right.len() {
        Ok(())
    } else {
        Err(AdapterError::Validation(format!(
            "{what}: expected {} entries, got {}",
            left.len(),
            right.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReadOnlyAdapter;

    #[async_trait]
    impl PerpsAdapter for ReadOnlyAdapter {
        fn protocol_id(&self) -> ProtocolId {
            ProtocolId::Perennial
        }

        fn supported_chains(&self) -> Vec<Chain> {
            vec![Chain::ARBITRUM]
        }
    }

    #[tokio::test]
    async fn default_operations_report_not_implemented() {
        let adapter = ReadOnlyAdapter;
        let err = adapter.get_all_markets().await.unwrap_err();
        assert!(matches!(
            err,
            AdapterError::NotImplemented {
                protocol: ProtocolId::Perennial,
                method: "get_all_markets"
            }
        ));

        let err = adapter
            .withdraw(Address::ZERO, "USDC", Decimal::ONE)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Method not implemented: PERENNIAL::withdraw");
    }

    #[test]
    fn ensure_paired_rejects_length_mismatch() {
        assert!(ensure_paired(&[1, 2], &["a", "b"], "closes").is_ok());
        let err = ensure_paired(&[1, 2], &["a"], "closes").unwrap_err();
        assert!(err.to_string().contains("expected 2 entries, got 1"));
    }
}
