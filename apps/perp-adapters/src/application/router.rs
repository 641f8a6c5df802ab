//! Consolidated router over all configured adapters.
//!
//! Cross-protocol reads fan out concurrently and report per-protocol
//! failures next to the items that did arrive. Market-scoped calls are
//! grouped by the protocol encoded in each [`MarketId`] and forwarded to the
//! owning adapter; results come back in caller order.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use alloy_primitives::Address;
use futures::future::join_all;
use rust_decimal::Decimal;

use super::ports::{AdapterResult, PerpsAdapter, ensure_paired};
use crate::domain::{
    AccountInfo, CancelOrder, ClosePosition, CloseTradePreview, CreateOrder, MarginPreview,
    MarketId, MarketInfo, MarketState, OpenTradePreview, OrderInfo, PositionInfo, ProtocolId,
    RouterOutput, UpdateOrder, UpdatePositionMargin,
};
use crate::error::AdapterError;
use crate::observability::record_adapter_call;

/// A protocol that failed during a fan-out read.
#[derive(Debug, Clone)]
pub struct ProtocolFailure {
    /// The failing protocol.
    pub protocol: ProtocolId,
    /// What went wrong.
    pub error: AdapterError,
}

/// Result of a fan-out read.
#[derive(Debug, Clone)]
pub struct Aggregated<T> {
    /// Items from protocols that answered.
    pub items: Vec<T>,
    /// Protocols that failed.
    pub failures: Vec<ProtocolFailure>,
}

impl<T> Aggregated<T> {
    /// Whether every queried protocol answered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<T> Default for Aggregated<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Routes requests to the adapter that owns each market.
#[derive(Clone, Default)]
pub struct AdapterRouter {
    adapters: BTreeMap<ProtocolId, Arc<dyn PerpsAdapter>>,
}

impl std::fmt::Debug for AdapterRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRouter")
            .field("protocols", &self.protocols())
            .finish()
    }
}

impl AdapterRouter {
    /// Empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any adapter for the same protocol.
    pub fn register(&mut self, adapter: Arc<dyn PerpsAdapter>) {
        let protocol = adapter.protocol_id();
        if self.adapters.insert(protocol, adapter).is_some() {
            tracing::warn!(%protocol, "Replacing previously registered adapter");
        }
    }

    /// Builder-style [`AdapterRouter::register`].
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn PerpsAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Registered protocols, in routing order.
    #[must_use]
    pub fn protocols(&self) -> Vec<ProtocolId> {
        self.adapters.keys().copied().collect()
    }

    /// Adapter for a protocol.
    pub fn adapter(&self, protocol: ProtocolId) -> AdapterResult<&Arc<dyn PerpsAdapter>> {
        self.adapters.get(&protocol).ok_or_else(|| {
            AdapterError::Validation(format!("no adapter registered for {protocol}"))
        })
    }

    // ------------------------------------------------------------------
    // Fan-out reads
    // ------------------------------------------------------------------

    /// Markets of every (or the selected) protocol.
    pub async fn get_all_markets(&self, only: Option<&[ProtocolId]>) -> Aggregated<MarketInfo> {
        self.fan_out(only, "get_all_markets", |adapter| async move {
            adapter.get_all_markets().await
        })
        .await
    }

    /// Positions of `wallet` across protocols.
    pub async fn get_all_positions(
        &self,
        wallet: Address,
        only: Option<&[ProtocolId]>,
    ) -> Aggregated<PositionInfo> {
        self.fan_out(only, "get_all_positions", |adapter| async move {
            adapter.get_all_positions(wallet).await
        })
        .await
    }

    /// Resting orders of `wallet` across protocols.
    pub async fn get_all_orders(
        &self,
        wallet: Address,
        only: Option<&[ProtocolId]>,
    ) -> Aggregated<OrderInfo> {
        self.fan_out(only, "get_all_orders", |adapter| async move {
            adapter.get_all_orders(wallet).await
        })
        .await
    }

    /// Account summaries of `wallet` across protocols.
    pub async fn get_account_info(
        &self,
        wallet: Address,
        only: Option<&[ProtocolId]>,
    ) -> Aggregated<AccountInfo> {
        self.fan_out(only, "get_account_info", |adapter| async move {
            adapter.get_account_info(wallet).await.map(|info| vec![info])
        })
        .await
    }

    async fn fan_out<T, F, Fut>(
        &self,
        only: Option<&[ProtocolId]>,
        operation: &'static str,
        call: F,
    ) -> Aggregated<T>
    where
        F: Fn(Arc<dyn PerpsAdapter>) -> Fut,
        Fut: Future<Output = AdapterResult<Vec<T>>>,
    {
        let selected: Vec<(ProtocolId, Arc<dyn PerpsAdapter>)> = self
            .adapters
            .iter()
            .filter(|(protocol, _)| only.is_none_or(|list| list.contains(protocol)))
            .map(|(protocol, adapter)| (*protocol, Arc::clone(adapter)))
            .collect();

        let calls = selected.into_iter().map(|(protocol, adapter)| {
            let fut = call(adapter);
            async move { (protocol, timed(protocol, operation, fut).await) }
        });

        let mut aggregated = Aggregated::default();
        for (protocol, result) in join_all(calls).await {
            match result {
                Ok(mut items) => aggregated.items.append(&mut items),
                Err(error) => {
                    tracing::warn!(%protocol, operation, error = %error, "Protocol read failed");
                    aggregated.failures.push(ProtocolFailure { protocol, error });
                }
            }
        }
        aggregated
    }

    // ------------------------------------------------------------------
    // Market-scoped reads
    // ------------------------------------------------------------------

    /// Prices for `market_ids`, in the same order.
    pub async fn get_market_prices(&self, market_ids: &[MarketId]) -> AdapterResult<Vec<Decimal>> {
        let groups = group_by_protocol(market_ids, MarketId::protocol);
        let mut out = vec![Decimal::ZERO; market_ids.len()];
        for (protocol, indices) in groups {
            let adapter = self.adapter(protocol)?;
            let ids = pick(market_ids, &indices);
            let prices = timed(protocol, "get_market_prices", adapter.get_market_prices(&ids)).await?;
            scatter(&mut out, &indices, prices, protocol)?;
        }
        Ok(out)
    }

    /// Market state for `market_ids`, in the same order.
    pub async fn get_markets_state(
        &self,
        market_ids: &[MarketId],
    ) -> AdapterResult<Vec<MarketState>> {
        let groups = group_by_protocol(market_ids, MarketId::protocol);
        let mut slots: Vec<Option<MarketState>> = vec![None; market_ids.len()];
        for (protocol, indices) in groups {
            let adapter = self.adapter(protocol)?;
            let ids = pick(market_ids, &indices);
            let states =
                timed(protocol, "get_markets_state", adapter.get_markets_state(&ids)).await?;
            scatter_opt(&mut slots, &indices, states, protocol)?;
        }
        Ok(slots.into_iter().flatten().collect())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Open or increase positions across venues.
    pub async fn create_order(
        &self,
        wallet: Address,
        orders: &[CreateOrder],
    ) -> AdapterResult<Vec<RouterOutput>> {
        let mut outputs = Vec::new();
        for (protocol, indices) in group_by_protocol(orders, |o| o.market_id.protocol()) {
            let adapter = self.adapter(protocol)?;
            let batch = pick(orders, &indices);
            tracing::info!(%protocol, %wallet, count = batch.len(), "Routing create_order");
            outputs.extend(timed(protocol, "create_order", adapter.create_order(wallet, &batch)).await?);
        }
        Ok(outputs)
    }

    /// Modify resting orders across venues.
    pub async fn update_order(
        &self,
        wallet: Address,
        orders: &[UpdateOrder],
    ) -> AdapterResult<Vec<RouterOutput>> {
        let mut outputs = Vec::new();
        for (protocol, indices) in group_by_protocol(orders, |o| o.market_id.protocol()) {
            let adapter = self.adapter(protocol)?;
            let batch = pick(orders, &indices);
            outputs.extend(timed(protocol, "update_order", adapter.update_order(wallet, &batch)).await?);
        }
        Ok(outputs)
    }

    /// Cancel resting orders across venues.
    pub async fn cancel_order(
        &self,
        wallet: Address,
        orders: &[CancelOrder],
    ) -> AdapterResult<Vec<RouterOutput>> {
        let mut outputs = Vec::new();
        for (protocol, indices) in group_by_protocol(orders, |o| o.market_id.protocol()) {
            let adapter = self.adapter(protocol)?;
            let batch = pick(orders, &indices);
            outputs.extend(timed(protocol, "cancel_order", adapter.cancel_order(wallet, &batch)).await?);
        }
        Ok(outputs)
    }

    /// Reduce or close positions across venues.
    pub async fn close_position(
        &self,
        wallet: Address,
        positions: &[PositionInfo],
        closes: &[ClosePosition],
    ) -> AdapterResult<Vec<RouterOutput>> {
        ensure_paired(positions, closes, "close_position")?;
        let mut outputs = Vec::new();
        for (protocol, indices) in group_by_protocol(positions, |p| p.market_id.protocol()) {
            let adapter = self.adapter(protocol)?;
            let batch = pick(positions, &indices);
            let batch_closes = pick(closes, &indices);
            outputs.extend(
                timed(
                    protocol,
                    "close_position",
                    adapter.close_position(wallet, &batch, &batch_closes),
                )
                .await?,
            );
        }
        Ok(outputs)
    }

    /// Add or remove margin across venues.
    pub async fn update_position_margin(
        &self,
        wallet: Address,
        positions: &[PositionInfo],
        updates: &[UpdatePositionMargin],
    ) -> AdapterResult<Vec<RouterOutput>> {
        ensure_paired(positions, updates, "update_position_margin")?;
        let mut outputs = Vec::new();
        for (protocol, indices) in group_by_protocol(positions, |p| p.market_id.protocol()) {
            let adapter = self.adapter(protocol)?;
            let batch = pick(positions, &indices);
            let batch_updates = pick(updates, &indices);
            outputs.extend(
                timed(
                    protocol,
                    "update_position_margin",
                    adapter.update_position_margin(wallet, &batch, &batch_updates),
                )
                .await?,
            );
        }
        Ok(outputs)
    }

    // ------------------------------------------------------------------
    // Previews
    // ------------------------------------------------------------------

    /// Previews for `orders`, in the same order.
    pub async fn get_open_trade_preview(
        &self,
        wallet: Address,
        orders: &[CreateOrder],
        existing: &[Option<PositionInfo>],
    ) -> AdapterResult<Vec<OpenTradePreview>> {
        ensure_paired(orders, existing, "get_open_trade_preview")?;
        let mut slots: Vec<Option<OpenTradePreview>> = vec![None; orders.len()];
        for (protocol, indices) in group_by_protocol(orders, |o| o.market_id.protocol()) {
            let adapter = self.adapter(protocol)?;
            let batch = pick(orders, &indices);
            let batch_existing = pick(existing, &indices);
            let previews = timed(
                protocol,
                "get_open_trade_preview",
                adapter.get_open_trade_preview(wallet, &batch, &batch_existing),
            )
            .await?;
            scatter_opt(&mut slots, &indices, previews, protocol)?;
        }
        Ok(slots.into_iter().flatten().collect())
    }

    /// Close previews, in caller order.
    pub async fn get_close_trade_preview(
        &self,
        wallet: Address,
        positions: &[PositionInfo],
        closes: &[ClosePosition],
    ) -> AdapterResult<Vec<CloseTradePreview>> {
        ensure_paired(positions, closes, "get_close_trade_preview")?;
        let mut slots: Vec<Option<CloseTradePreview>> = vec![None; positions.len()];
        for (protocol, indices) in group_by_protocol(positions, |p| p.market_id.protocol()) {
            let adapter = self.adapter(protocol)?;
            let batch = pick(positions, &indices);
            let batch_closes = pick(closes, &indices);
            let previews = timed(
                protocol,
                "get_close_trade_preview",
                adapter.get_close_trade_preview(wallet, &batch, &batch_closes),
            )
            .await?;
            scatter_opt(&mut slots, &indices, previews, protocol)?;
        }
        Ok(slots.into_iter().flatten().collect())
    }

    /// Margin previews, in caller order.
    pub async fn get_update_margin_preview(
        &self,
        wallet: Address,
        positions: &[PositionInfo],
        updates: &[UpdatePositionMargin],
    ) -> AdapterResult<Vec<MarginPreview>> {
        ensure_paired(positions, updates, "get_update_margin_preview")?;
        let mut slots: Vec<Option<MarginPreview>> = vec![None; positions.len()];
        for (protocol, indices) in group_by_protocol(positions, |p| p.market_id.protocol()) {
            let adapter = self.adapter(protocol)?;
            let batch = pick(positions, &indices);
            let batch_updates = pick(updates, &indices);
            let previews = timed(
                protocol,
                "get_update_margin_preview",
                adapter.get_update_margin_preview(wallet, &batch, &batch_updates),
            )
            .await?;
            scatter_opt(&mut slots, &indices, previews, protocol)?;
        }
        Ok(slots.into_iter().flatten().collect())
    }
}

/// Await `fut`, recording latency and outcome.
async fn timed<T>(
    protocol: ProtocolId,
    operation: &'static str,
    fut: impl Future<Output = AdapterResult<T>>,
) -> AdapterResult<T> {
    let started = Instant::now();
    let result = fut.await;
    let status = match &result {
        Ok(_) => "ok",
        Err(e) => e.code().reason(),
    };
    record_adapter_call(
        protocol.as_str(),
        operation,
        status,
        started.elapsed().as_secs_f64(),
    );
    result
}

/// Group item indices by protocol, keeping first-appearance order.
fn group_by_protocol<T>(
    items: &[T],
    protocol_of: impl Fn(&T) -> ProtocolId,
) -> Vec<(ProtocolId, Vec<usize>)> {
    let mut groups: Vec<(ProtocolId, Vec<usize>)> = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let protocol = protocol_of(item);
        match groups.iter_mut().find(|(p, _)| *p == protocol) {
            Some((_, indices)) => indices.push(index),
            None => groups.push((protocol, vec![index])),
        }
    }
    groups
}

fn pick<T: Clone>(items: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| items[i].clone()).collect()
}

fn scatter<T>(
    out: &mut [T],
    indices: &[usize],
    values: Vec<T>,
    protocol: ProtocolId,
) -> AdapterResult<()> {
    if values.len() != indices.len() {
        return Err(AdapterError::Validation(format!(
            "{protocol} returned {} results for {} inputs",
            values.len(),
            indices.len()
        )));
    }
    for (&index, value) in indices.iter().zip(values) {
        out[index] = value;
    }
    Ok(())
}

fn scatter_opt<T>(
    out: &mut [Option<T>],
    indices: &[usize],
    values: Vec<T>,
    protocol: ProtocolId,
) -> AdapterResult<()> {
    if values.len() != indices.len() {
        return Err(AdapterError::Validation(format!(
            "{protocol} returned {} results for {} inputs",
            values.len(),
            indices.len()
        )));
    }
    for (&index, value) in indices.iter().zip(values) {
        out[index] = Some(value);
    }
    Ok(())
}
