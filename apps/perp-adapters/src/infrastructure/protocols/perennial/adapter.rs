//! Perennial v2 Adapter
//!
//! Markets come from configuration. Prices, open interest and account
//! positions are read from the market contracts through Multicall3. Every
//! write is a single `MultiInvoker.invoke` transaction; price commitment and
//! trigger-order execution are left to Perennial keepers.

use std::sync::Arc;

use alloy::sol_types::SolCall;
use alloy_primitives::{Address, I256, U256};
use async_trait::async_trait;
use rust_decimal::Decimal;

use super::config::{PerennialConfig, PerennialMarketConfig};
use super::contracts::{
    IMarket, IMultiInvoker, Invocation, SIDE_LONG, SIDE_SHORT, TriggerOrder, cancel_order,
    place_order, update_position,
};
use super::math;
use crate::application::validation::{
    ensure_sufficient_balance, validate_close, validate_create_order, validate_margin_update,
};
use crate::application::{AdapterResult, PerpsAdapter, ports::ensure_paired};
use crate::config::{CacheConfig, HttpSettings, NetworkConfig};
use crate::domain::{
    AccountInfo, CancelOrder, Chain, ClosePosition, CloseTradePreview, CreateOrder, MarginPreview,
    MarketId, MarketInfo, MarketState, OpenTradePreview, OrderInfo, OrderStatus, OrderType,
    PositionInfo, ProtocolId, RouterOutput, Side, TokenBalance, TokenInfo, UnsignedTx, UpdateOrder,
    UpdatePositionMargin,
};
use crate::error::AdapterError;
use crate::infrastructure::cache::TimedCache;
use crate::infrastructure::evm::{
    MulticallBatch, RpcClient, erc20, from_units, from_units_signed, to_units, to_units_signed,
};

/// Perennial fixed-point values carry 6 decimals.
const FIXED6: u8 = 6;

/// Global market reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MarketReading {
    pub price: Decimal,
    pub annual_funding: Decimal,
    pub maker: Decimal,
    pub long: Decimal,
    pub short: Decimal,
}

/// One account's position in one market. Sizes stay raw so unchanged
/// sides round-trip exactly into `UPDATE_POSITION`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct AccountReading {
    pub maker: U256,
    pub long: U256,
    pub short: U256,
    pub collateral: I256,
}

impl AccountReading {
    fn side(&self) -> Option<Side> {
        if !self.long.is_zero() {
            Some(Side::Long)
        } else if !self.short.is_zero() {
            Some(Side::Short)
        } else {
            None
        }
    }

    const fn size(&self, side: Side) -> U256 {
        match side {
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }

    /// `(long, short)` with `side` replaced by `size`.
    const fn with_size(&self, side: Side, size: U256) -> (U256, U256) {
        match side {
            Side::Long => (size, self.short),
            Side::Short => (self.long, size),
        }
    }
}

/// Perennial v2 adapter.
#[derive(Debug)]
pub struct PerennialAdapter {
    config: PerennialConfig,
    chain: Chain,
    multicall: Address,
    rpc: RpcClient,
    markets: Vec<MarketInfo>,
    readings: TimedCache<(), Arc<Vec<MarketReading>>>,
}

impl PerennialAdapter {
    /// Build the adapter for `network`.
    pub fn new(
        config: PerennialConfig,
        network: &NetworkConfig,
        http: &HttpSettings,
        cache: &CacheConfig,
    ) -> AdapterResult<Self> {
        let chain = network.chain();
        let rpc = RpcClient::new(&network.rpc_client_config(http))?;
        let markets = config
            .markets
            .iter()
            .map(|m| market_info(chain, config.usdc, m))
            .collect();

        tracing::info!(
            chain = %chain,
            multi_invoker = %config.multi_invoker,
            markets = config.markets.len(),
            "Perennial adapter initialized"
        );

        Ok(Self {
            config,
            chain,
            multicall: network.multicall,
            rpc,
            markets,
            readings: TimedCache::new("perennial_markets", cache.prices.policy()),
        })
    }

    fn find(&self, id: &MarketId) -> AdapterResult<usize> {
        let not_found = || AdapterError::MarketNotFound(id.to_string());
        if id.protocol() != ProtocolId::Perennial || id.chain() != self.chain {
            return Err(not_found());
        }
        let address: Address = id.native_id().parse().map_err(|_| not_found())?;
        self.config
            .markets
            .iter()
            .position(|m| m.address == address)
            .ok_or_else(not_found)
    }

    async fn load_readings(&self) -> AdapterResult<Arc<Vec<MarketReading>>> {
        self.readings
            .get_or_fetch((), || async move {
                let mut batch = MulticallBatch::new();
                for market in &self.config.markets {
                    batch.push(market.address, &IMarket::globalCall {});
                    batch.push(market.address, &IMarket::positionCall {});
                }
                let results = batch.execute(&self.rpc, self.multicall).await?;

                let mut readings = Vec::with_capacity(self.config.markets.len());
                for i in 0..self.config.markets.len() {
                    let global = results.decode::<IMarket::globalCall>(2 * i)?._0;
                    let position = results.decode::<IMarket::positionCall>(2 * i + 1)?._0;
                    readings.push(MarketReading {
                        price: from_units_signed(global.latestPrice, FIXED6)?,
                        annual_funding: from_units_signed(global.pAccumulator._value, FIXED6)?,
                        maker: from_units(position.maker, FIXED6)?,
                        long: from_units(position.long, FIXED6)?,
                        short: from_units(position.short, FIXED6)?,
                    });
                }
                Ok::<_, AdapterError>(Arc::new(readings))
            })
            .await
    }

    async fn load_account(&self, wallet: Address) -> AdapterResult<Vec<AccountReading>> {
        let mut batch = MulticallBatch::new();
        for market in &self.config.markets {
            batch.push(market.address, &IMarket::positionsCall { account: wallet });
            batch.push(market.address, &IMarket::localsCall { account: wallet });
        }
        let results = batch.execute(&self.rpc, self.multicall).await?;

        (0..self.config.markets.len())
            .map(|i| {
                let position = results.decode::<IMarket::positionsCall>(2 * i)?._0;
                let local = results.decode::<IMarket::localsCall>(2 * i + 1)?._0;
                Ok(AccountReading {
                    maker: position.maker,
                    long: position.long,
                    short: position.short,
                    collateral: local.collateral,
                })
            })
            .collect()
    }

    /// Balance check plus USDC approval to the MultiInvoker for a deposit.
    /// `committed` carries the USDC earlier transactions of the batch deposit.
    async fn usdc_outputs(
        &self,
        wallet: Address,
        amount: Decimal,
        committed: &mut Decimal,
    ) -> AdapterResult<Vec<RouterOutput>> {
        if amount <= Decimal::ZERO {
            return Ok(Vec::new());
        }
        let total = *committed + amount;
        let required = to_units(total, FIXED6)?;
        let balance = erc20::balance_of(&self.rpc, self.config.usdc, wallet).await?;
        ensure_sufficient_balance("USDC", total, from_units(balance, FIXED6)?)?;
        *committed = total;

        let approval = erc20::approval_if_needed(
            &self.rpc,
            self.chain,
            self.config.usdc,
            "USDC",
            wallet,
            self.config.multi_invoker,
            required,
        )
        .await?;
        Ok(approval.into_iter().map(RouterOutput::Transaction).collect())
    }

    fn invoke_tx(&self, invocations: Vec<Invocation>, heading: String, description: String) -> UnsignedTx {
        UnsignedTx {
            chain: self.chain,
            to: self.config.multi_invoker,
            data: IMultiInvoker::invokeCall { invocations }.abi_encode().into(),
            value: U256::ZERO,
            heading,
            description,
        }
    }

    fn trigger_order(
        &self,
        side: Side,
        order_type: OrderType,
        price: Decimal,
        delta_tokens: Decimal,
    ) -> AdapterResult<TriggerOrder> {
        Ok(TriggerOrder {
            side: match side {
                Side::Long => SIDE_LONG,
                Side::Short => SIDE_SHORT,
            },
            comparison: comparison(side, order_type),
            fee: to_units(self.config.trigger_order_fee, FIXED6)?,
            price: to_units_signed(price, FIXED6)?,
            delta: to_units_signed(delta_tokens, FIXED6)?,
        })
    }
}

/// `-1` fills when the price falls to the trigger, `1` when it rises to it.
const fn comparison(side: Side, order_type: OrderType) -> i8 {
    match (side, order_type) {
        (Side::Long, OrderType::Limit | OrderType::StopLoss)
        | (Side::Short, OrderType::TakeProfit | OrderType::Market) => -1,
        (Side::Long, OrderType::TakeProfit | OrderType::Market)
        | (Side::Short, OrderType::Limit | OrderType::StopLoss) => 1,
    }
}

/// Trigger order type for a request; reduce-only limits become take profits.
const fn trigger_type(order_type: OrderType, reduce_only: bool) -> OrderType {
    match (order_type, reduce_only) {
        (OrderType::Limit, true) => OrderType::TakeProfit,
        (other, _) => other,
    }
}

fn market_info(chain: Chain, usdc: Address, market: &PerennialMarketConfig) -> MarketInfo {
    let collateral = vec![TokenInfo::erc20("USDC", usdc, FIXED6)];
    MarketInfo {
        market_id: MarketId::new(chain, ProtocolId::Perennial, market.address.to_checksum(None)),
        protocol: ProtocolId::Perennial,
        chain,
        index_token: TokenInfo::off_chain(market.symbol.clone(), FIXED6),
        long_collateral: collateral.clone(),
        short_collateral: collateral,
        min_leverage: Decimal::ZERO,
        max_leverage: market.max_leverage(),
        min_initial_margin_usd: market.min_margin,
        min_position_size_usd: Decimal::ZERO,
        maker_fee: market.maker_fee,
        taker_fee: market.taker_fee,
        price_precision: Decimal::new(1, u32::from(FIXED6)),
        size_precision: Decimal::new(1, u32::from(FIXED6)),
        supports_limit_orders: true,
        supports_partial_close: true,
    }
}

fn parse_nonce(order_id: &str) -> AdapterResult<U256> {
    order_id
        .parse()
        .map_err(|_| AdapterError::Validation(format!("invalid Perennial order nonce: {order_id}")))
}

#[async_trait]
impl PerpsAdapter for PerennialAdapter {
    fn protocol_id(&self) -> ProtocolId {
        ProtocolId::Perennial
    }

    fn supported_chains(&self) -> Vec<Chain> {
        vec![self.chain]
    }

    async fn setup(&self, wallet: Address) -> AdapterResult<Vec<RouterOutput>> {
        let current = erc20::allowance(&self.rpc, self.config.usdc, wallet, self.config.multi_invoker).await?;
        if !current.is_zero() {
            return Ok(Vec::new());
        }
        tracing::info!(wallet = %wallet, "Preparing Perennial USDC approval");
        Ok(vec![RouterOutput::Transaction(erc20::approve_tx(
            self.chain,
            self.config.usdc,
            "USDC",
            self.config.multi_invoker,
            U256::MAX,
        ))])
    }

    async fn get_all_markets(&self) -> AdapterResult<Vec<MarketInfo>> {
        Ok(self.markets.clone())
    }

    async fn get_market_prices(&self, market_ids: &[MarketId]) -> AdapterResult<Vec<Decimal>> {
        let readings = self.load_readings().await?;
        market_ids
            .iter()
            .map(|id| Ok(readings[self.find(id)?].price))
            .collect()
    }

    async fn get_markets_state(&self, market_ids: &[MarketId]) -> AdapterResult<Vec<MarketState>> {
        let readings = self.load_readings().await?;
        market_ids
            .iter()
            .map(|id| {
                let index = self.find(id)?;
                let r = readings[index];
                let long_oi = r.long * r.price;
                let short_oi = r.short * r.price;
                let (long_funding_rate, short_funding_rate) =
                    math::funding_rates_per_hour(r.annual_funding, long_oi, short_oi);
                Ok(MarketState {
                    market_id: self.markets[index].market_id.clone(),
                    price: r.price,
                    long_open_interest_usd: long_oi,
                    short_open_interest_usd: short_oi,
                    long_funding_rate,
                    short_funding_rate,
                    long_borrow_rate: Decimal::ZERO,
                    short_borrow_rate: Decimal::ZERO,
                    available_liquidity_usd: Some(
                        ((r.maker - (r.long - r.short).abs()) * r.price).max(Decimal::ZERO),
                    ),
                })
            })
            .collect()
    }

    async fn create_order(&self, wallet: Address, orders: &[CreateOrder]) -> AdapterResult<Vec<RouterOutput>> {
        let readings = self.load_readings().await?;
        let accounts = self.load_account(wallet).await?;
        let mut committed = Decimal::ZERO;
        let mut outputs = Vec::new();

        for order in orders {
            let index = self.find(&order.market_id)?;
            let market = &self.config.markets[index];
            let account = accounts[index];
            let reference = order.trigger_price.unwrap_or(readings[index].price);
            validate_create_order(order, &self.markets[index], reference, order.margin_delta)?;

            if account.side().is_some_and(|side| side != order.side) {
                return Err(AdapterError::Validation(format!(
                    "close the {} position on {} before opening {}",
                    order.side.opposite(),
                    market.symbol,
                    order.side
                )));
            }

            let size_tokens = order.size_tokens_at(reference);
            let size = to_units(size_tokens, FIXED6)?;
            let collateral = to_units_signed(order.margin_delta, FIXED6)?;
            let mut invocations = Vec::with_capacity(2);

            if order.order_type == OrderType::Market {
                let current = account.size(order.side);
                let target = if order.reduce_only {
                    current.saturating_sub(size)
                } else {
                    current + size
                };
                let (long, short) = account.with_size(order.side, target);
                invocations.push(update_position(market.address, account.maker, long, short, collateral, true));
            } else {
                if !collateral.is_zero() {
                    invocations.push(update_position(
                        market.address,
                        account.maker,
                        account.long,
                        account.short,
                        collateral,
                        true,
                    ));
                }
                let order_type = trigger_type(order.order_type, order.reduce_only);
                let delta = if order_type == OrderType::Limit {
                    size_tokens
                } else {
                    -size_tokens
                };
                invocations.push(place_order(
                    market.address,
                    self.trigger_order(order.side, order_type, reference, delta)?,
                ));
            }

            tracing::info!(
                wallet = %wallet,
                market = %order.market_id,
                side = %order.side,
                order_type = ?order.order_type,
                size_tokens = %size_tokens,
                "Building Perennial order"
            );
            outputs.extend(self.usdc_outputs(wallet, order.margin_delta, &mut committed).await?);
            outputs.push(RouterOutput::Transaction(self.invoke_tx(
                invocations,
                format!("{} {} {}", order_label(order.order_type), market.symbol, order.side),
                format!("{size_tokens} {} on Perennial at {reference}", market.symbol),
            )));
        }
        Ok(outputs)
    }

    async fn update_order(&self, wallet: Address, orders: &[UpdateOrder]) -> AdapterResult<Vec<RouterOutput>> {
        let mut invocations = Vec::with_capacity(orders.len() * 2);
        for update in orders {
            let market = &self.config.markets[self.find(&update.market_id)?];
            let nonce = parse_nonce(&update.order_id)?;
            if update.trigger_price <= Decimal::ZERO {
                return Err(AdapterError::Validation(
                    "trigger price must be positive".to_string(),
                ));
            }
            let size_tokens = if update.size_in_usd {
                update.size_delta / update.trigger_price
            } else {
                update.size_delta
            };
            let delta = if update.order_type == OrderType::Limit {
                size_tokens
            } else {
                -size_tokens
            };
            tracing::info!(wallet = %wallet, order_id = %update.order_id, market = %update.market_id, "Replacing Perennial trigger order");
            invocations.push(cancel_order(market.address, nonce));
            invocations.push(place_order(
                market.address,
                self.trigger_order(update.side, update.order_type, update.trigger_price, delta)?,
            ));
        }
        if invocations.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![RouterOutput::Transaction(self.invoke_tx(
            invocations,
            "Update orders".to_string(),
            format!("Replace {} Perennial trigger order(s)", orders.len()),
        ))])
    }

    async fn cancel_order(&self, _wallet: Address, orders: &[CancelOrder]) -> AdapterResult<Vec<RouterOutput>> {
        let invocations = orders
            .iter()
            .map(|cancel| {
                let market = &self.config.markets[self.find(&cancel.market_id)?];
                tracing::info!(order_id = %cancel.order_id, market = %cancel.market_id, "Canceling Perennial trigger order");
                Ok(cancel_order(market.address, parse_nonce(&cancel.order_id)?))
            })
            .collect::<AdapterResult<Vec<_>>>()?;
        if invocations.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![RouterOutput::Transaction(self.invoke_tx(
            invocations,
            "Cancel orders".to_string(),
            format!("Cancel {} Perennial trigger order(s)", orders.len()),
        ))])
    }

    async fn close_position(
        &self,
        wallet: Address,
        positions: &[PositionInfo],
        closes: &[ClosePosition],
    ) -> AdapterResult<Vec<RouterOutput>> {
        ensure_paired(positions, closes, "closes")?;
        let accounts = self.load_account(wallet).await?;
        let mut outputs = Vec::with_capacity(closes.len());

        for (position, close) in positions.iter().zip(closes) {
            validate_close(close, position)?;
            let index = self.find(&position.market_id)?;
            let market = &self.config.markets[index];
            let account = accounts[index];

            let invocation = if close.order_type == OrderType::Market {
                let current = account.size(position.side);
                let target = if close.is_full_close(position) {
                    U256::ZERO
                } else {
                    current.saturating_sub(to_units(close.close_size, FIXED6)?)
                };
                let (long, short) = account.with_size(position.side, target);
                update_position(market.address, account.maker, long, short, I256::ZERO, true)
            } else {
                let trigger = close.trigger_price.unwrap_or(position.mark_price);
                let order_type = trigger_type(close.order_type, true);
                place_order(
                    market.address,
                    self.trigger_order(position.side, order_type, trigger, -close.close_size)?,
                )
            };

            tracing::info!(wallet = %wallet, market = %position.market_id, close_size = %close.close_size, "Building Perennial close");
            outputs.push(RouterOutput::Transaction(self.invoke_tx(
                vec![invocation],
                format!("Close {} {}", market.symbol, position.side),
                format!("Close {} {} on Perennial", close.close_size, market.symbol),
            )));
        }
        Ok(outputs)
    }

    async fn update_position_margin(
        &self,
        wallet: Address,
        positions: &[PositionInfo],
        updates: &[UpdatePositionMargin],
    ) -> AdapterResult<Vec<RouterOutput>> {
        ensure_paired(positions, updates, "margin updates")?;
        let accounts = self.load_account(wallet).await?;
        let mut committed = Decimal::ZERO;
        let mut outputs = Vec::with_capacity(updates.len());

        for (position, update) in positions.iter().zip(updates) {
            validate_margin_update(update, position)?;
            let index = self.find(&position.market_id)?;
            let market = &self.config.markets[index];
            let account = accounts[index];
            let delta = to_units_signed(update.signed_delta(), FIXED6)?;

            if update.is_deposit {
                outputs.extend(self.usdc_outputs(wallet, update.margin_delta, &mut committed).await?);
            }
            tracing::info!(wallet = %wallet, market = %position.market_id, delta = %update.signed_delta(), "Building Perennial margin update");
            outputs.push(RouterOutput::Transaction(self.invoke_tx(
                vec![update_position(market.address, account.maker, account.long, account.short, delta, true)],
                format!("{} {} margin", if update.is_deposit { "Add" } else { "Remove" }, market.symbol),
                format!("Move {} USDC on Perennial {}", update.signed_delta(), market.symbol),
            )));
        }
        Ok(outputs)
    }

    async fn get_all_positions(&self, wallet: Address) -> AdapterResult<Vec<PositionInfo>> {
        let readings = self.load_readings().await?;
        let accounts = self.load_account(wallet).await?;

        let mut positions = Vec::new();
        for (index, account) in accounts.iter().enumerate() {
            let Some(side) = account.side() else {
                continue;
            };
            let market = &self.config.markets[index];
            let mark = readings[index].price;
            let size_tokens = from_units(account.size(side), FIXED6)?;
            let margin_usd = from_units_signed(account.collateral, FIXED6)?;
            positions.push(PositionInfo {
                position_id: market.address.to_checksum(None),
                market_id: self.markets[index].market_id.clone(),
                side,
                size_tokens,
                size_usd: size_tokens * mark,
                margin_usd,
                // Collateral is settled to the latest price, so the position
                // carries no separate entry price or unrealized PnL.
                avg_entry_price: mark,
                mark_price: mark,
                leverage: math::leverage(size_tokens, mark, margin_usd),
                liquidation_price: math::liquidation_price(side, size_tokens, mark, margin_usd, market.maintenance),
                unrealized_pnl: Decimal::ZERO,
                accrued_funding: Decimal::ZERO,
                accrued_borrowing: Decimal::ZERO,
                collateral_token: "USDC".to_string(),
            });
        }
        Ok(positions)
    }

    async fn get_all_orders(&self, wallet: Address) -> AdapterResult<Vec<OrderInfo>> {
        let latest = self
            .rpc
            .call(self.config.multi_invoker, &IMultiInvoker::latestNonceCall {})
            .await?
            ._0;
        let latest = u64::try_from(latest)
            .map_err(|_| AdapterError::Conversion(format!("nonce {latest} exceeds u64")))?;
        let first = latest.saturating_sub(self.config.order_scan_depth) + 1;

        let mut batch = MulticallBatch::new();
        let mut slots = Vec::new();
        for (index, market) in self.config.markets.iter().enumerate() {
            for nonce in first..=latest {
                batch.push(
                    self.config.multi_invoker,
                    &IMultiInvoker::ordersCall {
                        account: wallet,
                        market: market.address,
                        nonce: U256::from(nonce),
                    },
                );
                slots.push((index, nonce));
            }
        }
        let results = batch.execute(&self.rpc, self.multicall).await?;

        let mut orders = Vec::new();
        for (slot, (index, nonce)) in slots.into_iter().enumerate() {
            let Some(order) = results.try_decode::<IMultiInvoker::ordersCall>(slot).map(|r| r._0) else {
                continue;
            };
            if let Some(info) = map_trigger_order(&self.markets[index].market_id, nonce, &order)? {
                orders.push(info);
            }
        }
        Ok(orders)
    }

    async fn get_account_info(&self, wallet: Address) -> AdapterResult<AccountInfo> {
        let readings = self.load_readings().await?;
        let accounts = self.load_account(wallet).await?;
        let wallet_usdc = from_units(erc20::balance_of(&self.rpc, self.config.usdc, wallet).await?, FIXED6)?;

        let mut deposited = Decimal::ZERO;
        let mut free = wallet_usdc;
        for (index, account) in accounts.iter().enumerate() {
            let collateral = from_units_signed(account.collateral, FIXED6)?;
            let market = &self.config.markets[index];
            let size = account
                .side()
                .map_or(Ok(Decimal::ZERO), |side| from_units(account.size(side), FIXED6))?;
            let required = math::requirement_usd(size, readings[index].price, market.margin, market.min_margin);
            deposited += collateral;
            free += (collateral - required).max(Decimal::ZERO);
        }

        Ok(AccountInfo {
            protocol: ProtocolId::Perennial,
            wallet,
            total_collateral_usd: deposited + wallet_usdc,
            free_collateral_usd: free,
            margin_ratio: None,
            balances: vec![TokenBalance {
                token: "USDC".to_string(),
                amount: wallet_usdc,
                locked: Decimal::ZERO,
            }],
        })
    }

    async fn get_open_trade_preview(
        &self,
        _wallet: Address,
        orders: &[CreateOrder],
        existing: &[Option<PositionInfo>],
    ) -> AdapterResult<Vec<OpenTradePreview>> {
        ensure_paired(orders, existing, "existing positions")?;
        let readings = self.load_readings().await?;
        orders
            .iter()
            .zip(existing)
            .map(|(order, current)| {
                let index = self.find(&order.market_id)?;
                let price = order.trigger_price.unwrap_or(readings[index].price);
                Ok(open_preview(
                    order,
                    current.as_ref(),
                    &self.markets[index],
                    &self.config.markets[index],
                    price,
                ))
            })
            .collect()
    }

    async fn get_close_trade_preview(
        &self,
        _wallet: Address,
        positions: &[PositionInfo],
        closes: &[ClosePosition],
    ) -> AdapterResult<Vec<CloseTradePreview>> {
        ensure_paired(positions, closes, "closes")?;
        positions
            .iter()
            .zip(closes)
            .map(|(position, close)| {
                let index = self.find(&position.market_id)?;
                Ok(close_preview(position, close, &self.config.markets[index]))
            })
            .collect()
    }

    async fn get_update_margin_preview(
        &self,
        _wallet: Address,
        positions: &[PositionInfo],
        updates: &[UpdatePositionMargin],
    ) -> AdapterResult<Vec<MarginPreview>> {
        ensure_paired(positions, updates, "margin updates")?;
        positions
            .iter()
            .zip(updates)
            .map(|(position, update)| {
                let index = self.find(&position.market_id)?;
                Ok(margin_preview(position, update, &self.config.markets[index]))
            })
            .collect()
    }
}

const fn order_label(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "Market",
        OrderType::Limit => "Limit",
        OrderType::StopLoss => "Stop loss",
        OrderType::TakeProfit => "Take profit",
    }
}

fn map_trigger_order(market_id: &MarketId, nonce: u64, order: &TriggerOrder) -> AdapterResult<Option<OrderInfo>> {
    let side = match order.side {
        SIDE_LONG => Side::Long,
        SIDE_SHORT => Side::Short,
        _ => return Ok(None),
    };
    if order.delta.is_zero() {
        return Ok(None);
    }
    let delta = from_units_signed(order.delta, FIXED6)?;
    let price = from_units_signed(order.price, FIXED6)?;
    let order_type = if delta > Decimal::ZERO {
        OrderType::Limit
    } else if order.comparison == comparison(side, OrderType::StopLoss) {
        OrderType::StopLoss
    } else {
        OrderType::TakeProfit
    };
    let size_tokens = delta.abs();

    Ok(Some(OrderInfo {
        order_id: nonce.to_string(),
        market_id: market_id.clone(),
        side,
        order_type,
        size_tokens,
        size_usd: size_tokens * price,
        trigger_price: Some(price),
        margin_delta: Decimal::ZERO,
        reduce_only: delta < Decimal::ZERO,
        status: OrderStatus::Open,
        created_at: None,
    }))
}

pub(crate) fn open_preview(
    order: &CreateOrder,
    existing: Option<&PositionInfo>,
    info: &MarketInfo,
    market: &PerennialMarketConfig,
    price: Decimal,
) -> OpenTradePreview {
    let added_tokens = order.size_tokens_at(price);
    let fee = added_tokens * price * market.taker_fee;
    let (base_tokens, base_margin) = existing.map_or((Decimal::ZERO, Decimal::ZERO), |p| (p.size_tokens, p.margin_usd));
    let size_tokens = base_tokens + added_tokens;
    let margin_usd = base_margin + order.margin_delta - fee;

    let preview = OpenTradePreview {
        market_id: order.market_id.clone(),
        side: order.side,
        size_tokens,
        size_usd: size_tokens * price,
        margin_usd,
        leverage: math::leverage(size_tokens, price, margin_usd),
        avg_entry_price: price,
        liquidation_price: math::liquidation_price(order.side, size_tokens, price, margin_usd, market.maintenance),
        fee_usd: fee,
        is_valid: true,
        error_message: None,
    };

    if existing.is_some_and(|p| p.side != order.side) {
        return preview.invalid("an opposite position is open in this market");
    }
    if let Err(err) = validate_create_order(order, info, price, order.margin_delta) {
        return preview.invalid(err.to_string());
    }
    let required = math::requirement_usd(size_tokens, price, market.margin, market.min_margin);
    if margin_usd < required {
        return preview.invalid(format!(
            "collateral {margin_usd} USD is below the required {required} USD"
        ));
    }
    preview
}

pub(crate) fn close_preview(
    position: &PositionInfo,
    close: &ClosePosition,
    market: &PerennialMarketConfig,
) -> CloseTradePreview {
    let price = close.trigger_price.unwrap_or(position.mark_price);
    let full = close.is_full_close(position);
    let closed = close.close_size.min(position.size_tokens);
    let fraction = if position.size_tokens.is_zero() {
        Decimal::ONE
    } else {
        closed / position.size_tokens
    };
    let fee = closed * price * market.taker_fee;
    let realized = position.unrealized_pnl * fraction;
    let remaining_tokens = position.size_tokens - closed;

    let (received, remaining_margin) = if full {
        ((position.margin_usd + realized - fee).max(Decimal::ZERO), Decimal::ZERO)
    } else {
        (Decimal::ZERO, position.margin_usd + realized - fee)
    };

    let mut preview = CloseTradePreview {
        market_id: position.market_id.clone(),
        side: position.side,
        remaining_size_tokens: remaining_tokens,
        remaining_margin_usd: remaining_margin,
        leverage: math::leverage(remaining_tokens, price, remaining_margin),
        liquidation_price: (!full)
            .then(|| math::liquidation_price(position.side, remaining_tokens, price, remaining_margin, market.maintenance))
            .flatten(),
        realized_pnl: realized,
        received_margin_usd: received,
        fee_usd: fee,
        is_valid: true,
        error_message: None,
    };

    let maintenance = math::requirement_usd(remaining_tokens, price, market.maintenance, market.min_maintenance);
    let reason = match validate_close(close, position) {
        Err(err) => Some(err.to_string()),
        Ok(()) if !full && remaining_margin < maintenance => {
            Some("remaining collateral is below maintenance".to_string())
        }
        Ok(()) => None,
    };
    if let Some(reason) = reason {
        preview.is_valid = false;
        preview.error_message = Some(reason);
    }
    preview
}

pub(crate) fn margin_preview(
    position: &PositionInfo,
    update: &UpdatePositionMargin,
    market: &PerennialMarketConfig,
) -> MarginPreview {
    let margin_usd = position.margin_usd + update.signed_delta();
    let price = position.mark_price;
    let mut preview = MarginPreview {
        market_id: position.market_id.clone(),
        margin_usd,
        leverage: math::leverage(position.size_tokens, price, margin_usd),
        liquidation_price: math::liquidation_price(position.side, position.size_tokens, price, margin_usd, market.maintenance),
        is_valid: true,
        error_message: None,
    };

    let required = math::requirement_usd(position.size_tokens, price, market.margin, market.min_margin);
    let reason = match validate_margin_update(update, position) {
        Err(err) => Some(err.to_string()),
        Ok(()) if !update.is_deposit && margin_usd < required => Some(format!(
            "collateral {margin_usd} USD would fall below the required {required} USD"
        )),
        Ok(()) => None,
    };
    if let Some(reason) = reason {
        preview.is_valid = false;
        preview.error_message = Some(reason);
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::evm::MULTICALL3_ADDRESS;
    use alloy::sol_types::SolValue;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn eth() -> PerennialMarketConfig {
        PerennialMarketConfig {
            symbol: "ETH".to_string(),
            address: Address::repeat_byte(0xe7),
            maintenance: dec!(0.01),
            margin: dec!(0.02),
            min_maintenance: dec!(5),
            min_margin: dec!(10),
            taker_fee: dec!(0.001),
            maker_fee: Decimal::ZERO,
        }
    }

    fn info() -> MarketInfo {
        market_info(Chain::ARBITRUM, Address::repeat_byte(0xcc), &eth())
    }

    fn position() -> PositionInfo {
        PositionInfo {
            position_id: "0x".to_string(),
            market_id: info().market_id,
            side: Side::Long,
            size_tokens: dec!(2),
            size_usd: dec!(4000),
            margin_usd: dec!(400),
            avg_entry_price: dec!(2000),
            mark_price: dec!(2000),
            leverage: dec!(10),
            liquidation_price: None,
            unrealized_pnl: Decimal::ZERO,
            accrued_funding: Decimal::ZERO,
            accrued_borrowing: Decimal::ZERO,
            collateral_token: "USDC".to_string(),
        }
    }

    async fn usdc_wallet(balance: u64) -> (MockServer, PerennialAdapter) {
        let server = MockServer::start().await;
        for (selector, value) in [("0x70a08231", U256::from(balance)), ("0xdd62ed3e", U256::MAX)] {
            Mock::given(method("POST"))
                .and(body_string_contains(selector))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": alloy_primitives::hex::encode_prefixed(value.abi_encode())
                })))
                .mount(&server)
                .await;
        }
        let config = PerennialConfig {
            enabled: true,
            network: "arbitrum".to_string(),
            multi_invoker: Address::repeat_byte(0x1e),
            usdc: Address::repeat_byte(0xcc),
            markets: vec![eth()],
            trigger_order_fee: dec!(0.5),
            order_scan_depth: 50,
        };
        let network = NetworkConfig {
            chain_id: 42_161,
            rpc_url: server.uri(),
            multicall: MULTICALL3_ADDRESS,
        };
        let adapter =
            PerennialAdapter::new(config, &network, &HttpSettings::default(), &CacheConfig::default()).unwrap();
        (server, adapter)
    }

    #[tokio::test]
    async fn deposits_in_one_batch_share_the_usdc_balance() {
        let (_server, adapter) = usdc_wallet(1_000_000_000).await;
        let wallet = Address::repeat_byte(0x01);
        let mut committed = Decimal::ZERO;

        let first = adapter.usdc_outputs(wallet, dec!(600), &mut committed).await.unwrap();
        assert!(first.is_empty());
        assert_eq!(committed, dec!(600));

        let second = adapter.usdc_outputs(wallet, dec!(600), &mut committed).await;
        assert!(matches!(second, Err(AdapterError::InsufficientBalance { .. })), "{second:?}");
        assert_eq!(committed, dec!(600));
    }

    #[test]
    fn max_leverage_is_inverse_margin() {
        assert_eq!(info().max_leverage, dec!(50));
        assert_eq!(info().index_token.symbol, "ETH");
    }

    #[test]
    fn comparison_direction() {
        assert_eq!(comparison(Side::Long, OrderType::Limit), -1);
        assert_eq!(comparison(Side::Long, OrderType::TakeProfit), 1);
        assert_eq!(comparison(Side::Short, OrderType::StopLoss), 1);
        assert_eq!(comparison(Side::Short, OrderType::TakeProfit), -1);
        assert_eq!(trigger_type(OrderType::Limit, true), OrderType::TakeProfit);
    }

    #[test]
    fn account_side_and_resize() {
        let account = AccountReading {
            short: U256::from(3_000_000u64),
            ..AccountReading::default()
        };
        assert_eq!(account.side(), Some(Side::Short));
        assert_eq!(
            account.with_size(Side::Short, U256::from(1u64)),
            (U256::ZERO, U256::from(1u64))
        );
        assert_eq!(AccountReading::default().side(), None);
    }

    #[test]
    fn trigger_orders_decode_by_delta_and_comparison() {
        let market_id = info().market_id;
        let stop = TriggerOrder {
            side: SIDE_LONG,
            comparison: -1,
            fee: U256::ZERO,
            price: I256::try_from(1_800_000_000i64).unwrap(),
            delta: I256::try_from(-500_000i64).unwrap(),
        };
        let info = map_trigger_order(&market_id, 7, &stop).unwrap().unwrap();
        assert_eq!(info.order_type, OrderType::StopLoss);
        assert_eq!(info.order_id, "7");
        assert_eq!(info.size_tokens, dec!(0.5));
        assert_eq!(info.trigger_price, Some(dec!(1800)));
        assert!(info.reduce_only);

        let empty = TriggerOrder {
            side: 0,
            comparison: 0,
            fee: U256::ZERO,
            price: I256::ZERO,
            delta: I256::ZERO,
        };
        assert!(map_trigger_order(&market_id, 8, &empty).unwrap().is_none());
    }

    #[test]
    fn open_preview_charges_taker_fee() {
        let order = CreateOrder::market(info().market_id, Side::Long, dec!(4000), dec!(400), "USDC");
        let preview = open_preview(&order, None, &info(), &eth(), dec!(2000));
        assert!(preview.is_valid, "{:?}", preview.error_message);
        assert_eq!(preview.size_tokens, dec!(2));
        assert_eq!(preview.fee_usd, dec!(4));
        assert_eq!(preview.margin_usd, dec!(396));
    }

    #[test]
    fn open_preview_enforces_margin_floor() {
        let order = CreateOrder::market(info().market_id, Side::Long, dec!(100), dec!(5), "USDC");
        let preview = open_preview(&order, None, &info(), &eth(), dec!(2000));
        assert!(!preview.is_valid);
    }

    #[test]
    fn partial_close_keeps_margin_minus_fee() {
        let close = ClosePosition::market(dec!(1), dec!(0.01));
        let preview = close_preview(&position(), &close, &eth());
        assert!(preview.is_valid);
        assert_eq!(preview.fee_usd, dec!(2));
        assert_eq!(preview.remaining_margin_usd, dec!(398));
        assert_eq!(preview.remaining_size_tokens, dec!(1));
    }

    #[test]
    fn withdrawing_below_margin_requirement_is_invalid() {
        let update = UpdatePositionMargin {
            margin_delta: dec!(350),
            is_deposit: false,
            collateral_token: "USDC".to_string(),
        };
        // requirement = max(2 * 2000 * 0.02, 10) = 80
        let preview = margin_preview(&position(), &update, &eth());
        assert_eq!(preview.margin_usd, dec!(50));
        assert!(!preview.is_valid);
    }
}
