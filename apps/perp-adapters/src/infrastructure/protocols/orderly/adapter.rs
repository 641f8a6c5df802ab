//! Orderly Adapter
//!
//! Cross-margined order book. Market data comes from the public REST API;
//! orders go straight to the private API signed with the account's Orderly
//! key, so writes return [`RouterOutput::ApiAck`]. Account actions that need
//! the wallet (registration, key management, withdrawals) return EIP-712
//! payloads, and deposits return a `Vault.deposit` transaction.

use std::sync::Arc;

use alloy::sol_types::{Eip712Domain, SolCall};
use alloy_primitives::{Address, B256, U256, keccak256};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use super::api_types::{
    Ack, AccountLookup, AlgoOrderCreated, AlgoOrderRow, EditAlgoOrder, EditOrder, Envelope, FuturesInfo,
    HoldingData, NewAlgoOrder, NewOrder, OrderCreated, OrderRow, OrderlyKeyInfo, PositionRow, PositionsData,
    RegistrationNonce, Rows, SymbolInfo, WithdrawNonce,
};
use super::auth::{OrderlyAuth, account_id};
use super::config::OrderlyConfig;
use super::typed_data;
use crate::application::validation::{ensure_sufficient_balance, validate_close, validate_create_order};
use crate::application::{AdapterResult, PerpsAdapter, ports::ensure_paired};
use crate::config::{CacheConfig, HttpSettings, NetworkConfig};
use crate::domain::{
    AccountInfo, CancelOrder, Chain, ClosePosition, CloseTradePreview, CreateOrder, MarketId, MarketInfo,
    MarketState, OpenTradePreview, OrderInfo, OrderStatus, OrderType, PositionInfo, ProtocolId, RouterOutput,
    Side, TokenBalance, TokenInfo, UnsignedTx, UpdateOrder, unrealized_pnl,
};
use crate::error::{AdapterError, HttpError};
use crate::infrastructure::cache::TimedCache;
use crate::infrastructure::evm::{RpcClient, erc20, from_units, to_units};
use crate::infrastructure::http::JsonHttpClient;
use crate::infrastructure::protocols::common::{
    ensure_wallet, linear_liquidation_price, now_millis, round_down_to_step,
};

/// Collateral token of every Orderly perp.
const USDC: &str = "USDC";
const USDC_DECIMALS: u8 = 6;
/// Prefix that marks algo (trigger) order ids.
const ALGO_PREFIX: &str = "algo:";
/// Funding is quoted per 8h period.
const FUNDING_PERIOD_HOURS: Decimal = Decimal::from_parts(8, 0, 0, false, 0);

alloy::sol! {
    #![sol(all_derives)]

    struct VaultDepositFE {
        bytes32 accountId;
        bytes32 brokerHash;
        bytes32 tokenHash;
        uint128 tokenAmount;
    }

    interface IVault {
        function deposit(VaultDepositFE data) external payable;
        function getDepositFee(address receiver, VaultDepositFE data) external view returns (uint256);
    }
}

/// Market with the venue limits needed for sizing and margin.
#[derive(Debug, Clone)]
pub(crate) struct OrderlyMarket {
    pub info: MarketInfo,
    pub symbol: SymbolInfo,
}

/// Orderly adapter.
#[derive(Debug)]
pub struct OrderlyAdapter {
    config: OrderlyConfig,
    chain: Chain,
    account_id: B256,
    public: JsonHttpClient,
    private: Option<JsonHttpClient>,
    orderly_key: Option<String>,
    rpc: RpcClient,
    domain: Eip712Domain,
    markets: TimedCache<(), Arc<Vec<OrderlyMarket>>>,
    futures: TimedCache<(), Arc<Vec<FuturesInfo>>>,
}

impl OrderlyAdapter {
    /// Build the adapter. Account endpoints stay unavailable without
    /// `orderly_secret`.
    pub fn new(
        config: OrderlyConfig,
        network: &NetworkConfig,
        http: &HttpSettings,
        cache: &CacheConfig,
    ) -> AdapterResult<Self> {
        let chain = network.chain();
        let client_config = http.client_config(&config.base_url);
        let account_id = account_id(config.account_address, &config.broker_id);

        let (private, orderly_key) = match config.orderly_secret.as_deref() {
            Some(secret) => {
                let auth = OrderlyAuth::new(account_id, secret)?;
                let key = auth.public_key().to_string();
                (Some(JsonHttpClient::new(&client_config, Arc::new(auth))?), Some(key))
            }
            None => (None, None),
        };

        tracing::info!(
            chain = %chain,
            account_id = %account_id,
            broker_id = %config.broker_id,
            authenticated = private.is_some(),
            "Orderly adapter initialized"
        );

        Ok(Self {
            chain,
            account_id,
            public: JsonHttpClient::public(&client_config)?,
            private,
            orderly_key,
            rpc: RpcClient::new(&network.rpc_client_config(http))?,
            domain: typed_data::off_chain_domain(chain.id(), config.verifying_contract),
            markets: TimedCache::new("orderly_markets", cache.markets.policy()),
            futures: TimedCache::new("orderly_futures", cache.prices.policy()),
            config,
        })
    }

    /// Orderly account id of the configured wallet.
    #[must_use]
    pub const fn account_id(&self) -> B256 {
        self.account_id
    }

    // ========================================================================
    // Clients
    // ========================================================================

    /// Signed client for `wallet`, which must be the configured account.
    fn account(&self, wallet: Address) -> AdapterResult<&JsonHttpClient> {
        ensure_wallet(ProtocolId::Orderly, self.config.account_address, wallet)?;
        self.private
            .as_ref()
            .ok_or_else(|| AdapterError::Config("orderly_secret is required for Orderly account endpoints".to_string()))
    }

    // ========================================================================
    // Loaders
    // ========================================================================

    async fn load_markets(&self) -> AdapterResult<Arc<Vec<OrderlyMarket>>> {
        self.markets
            .get_or_fetch((), || async move {
                let rows = self
                    .public
                    .get_public::<Envelope<Rows<SymbolInfo>>>("/v1/public/info")
                    .await?
                    .into_data()?
                    .rows;
                let markets: Vec<_> = rows
                    .into_iter()
                    .map(|symbol| OrderlyMarket {
                        info: market_info(self.chain, &symbol, &self.config),
                        symbol,
                    })
                    .collect();
                tracing::debug!(count = markets.len(), "Loaded Orderly markets");
                Ok::<_, AdapterError>(Arc::new(markets))
            })
            .await
    }

    async fn load_futures(&self) -> AdapterResult<Arc<Vec<FuturesInfo>>> {
        self.futures
            .get_or_fetch((), || async move {
                let rows = self
                    .public
                    .get_public::<Envelope<Rows<FuturesInfo>>>("/v1/public/futures")
                    .await?
                    .into_data()?
                    .rows;
                Ok::<_, AdapterError>(Arc::new(rows))
            })
            .await
    }

    async fn load_positions(&self, client: &JsonHttpClient) -> AdapterResult<PositionsData> {
        client.get::<Envelope<PositionsData>>("/v1/positions").await?.into_data()
    }

    async fn load_holding(&self, client: &JsonHttpClient) -> AdapterResult<HoldingData> {
        client.get::<Envelope<HoldingData>>("/v1/client/holding").await?.into_data()
    }

    async fn load_open_orders(&self, client: &JsonHttpClient) -> AdapterResult<Vec<OrderRow>> {
        Ok(client
            .get::<Envelope<Rows<OrderRow>>>("/v1/orders?status=INCOMPLETE")
            .await?
            .into_data()?
            .rows)
    }

    fn resolve<'a>(&self, markets: &'a [OrderlyMarket], id: &MarketId) -> AdapterResult<&'a OrderlyMarket> {
        if id.protocol() != ProtocolId::Orderly || id.chain() != self.chain {
            return Err(AdapterError::MarketNotFound(id.to_string()));
        }
        markets
            .iter()
            .find(|m| m.symbol.symbol == id.native_id())
            .ok_or_else(|| AdapterError::MarketNotFound(id.to_string()))
    }

    fn market_id(&self, symbol: &str) -> MarketId {
        MarketId::new(self.chain, ProtocolId::Orderly, symbol)
    }

    async fn is_registered(&self, wallet: Address) -> AdapterResult<bool> {
        let path = format!("/v1/get_account?address={wallet}&broker_id={}", self.config.broker_id);
        match self.public.get_public::<Envelope<AccountLookup>>(&path).await {
            Ok(envelope) => Ok(envelope.success && envelope.data.is_some()),
            Err(HttpError::Api { .. } | HttpError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn key_is_active(&self, key: &str) -> AdapterResult<bool> {
        let path = format!("/v1/get_orderly_key?account_id={}&orderly_key={key}", self.account_id);
        match self.public.get_public::<Envelope<OrderlyKeyInfo>>(&path).await {
            Ok(envelope) => Ok(envelope
                .data
                .and_then(|k| k.expiration)
                .is_some_and(|expiration| expiration > now_millis())),
            Err(HttpError::Api { .. } | HttpError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    // ========================================================================
    // Submission
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    async fn submit(
        &self,
        client: &JsonHttpClient,
        market: &OrderlyMarket,
        side: &'static str,
        order_type: OrderType,
        quantity: Decimal,
        price: Option<Decimal>,
        reduce_only: bool,
    ) -> AdapterResult<RouterOutput> {
        let symbol = market.symbol.symbol.clone();
        let (reference, message) = match order_type {
            OrderType::Market | OrderType::Limit => {
                let body = NewOrder {
                    symbol,
                    order_type: if order_type == OrderType::Market { "MARKET" } else { "LIMIT" },
                    order_price: price
                        .filter(|_| order_type == OrderType::Limit)
                        .map(|p| round_down_to_step(p, market.symbol.quote_tick)),
                    order_quantity: quantity,
                    side,
                    reduce_only,
                    client_order_id: uuid::Uuid::new_v4().simple().to_string(),
                };
                let created = client.post::<Envelope<OrderCreated>, _>("/v1/order", &body).await?.into_data()?;
                (created.order_id.to_string(), format!("{side} {quantity} {}", body.symbol))
            }
            OrderType::StopLoss | OrderType::TakeProfit => {
                let trigger = price.ok_or_else(|| {
                    AdapterError::Validation(format!("{order_type:?} requires a trigger price"))
                })?;
                let body = NewAlgoOrder {
                    symbol,
                    algo_type: "STOP",
                    order_type: "MARKET",
                    side,
                    quantity,
                    trigger_price: round_down_to_step(trigger, market.symbol.quote_tick),
                    reduce_only,
                };
                let created = client
                    .post::<Envelope<AlgoOrderCreated>, _>("/v1/algo/order", &body)
                    .await?
                    .into_data()?;
                let id = created
                    .rows
                    .first()
                    .map(|r| format!("{ALGO_PREFIX}{}", r.order_id))
                    .ok_or_else(|| AdapterError::Http(HttpError::JsonParse("empty algo order response".to_string())))?;
                (id, format!("{side} {quantity} {} stop at {}", body.symbol, body.trigger_price))
            }
        };

        tracing::info!(order_id = %reference, market = %market.info.market_id, "Orderly order accepted");
        Ok(RouterOutput::ApiAck {
            protocol: ProtocolId::Orderly,
            reference,
            message,
        })
    }
}

// ============================================================================
// Mapping
// ============================================================================

fn market_info(chain: Chain, symbol: &SymbolInfo, config: &OrderlyConfig) -> MarketInfo {
    let usdc = vec![TokenInfo::off_chain(USDC, USDC_DECIMALS)];
    MarketInfo {
        market_id: MarketId::new(chain, ProtocolId::Orderly, symbol.symbol.clone()),
        protocol: ProtocolId::Orderly,
        chain,
        index_token: TokenInfo::off_chain(symbol.base(), u8::try_from(symbol.base_tick.scale()).unwrap_or(18)),
        long_collateral: usdc.clone(),
        short_collateral: usdc,
        min_leverage: Decimal::ZERO,
        max_leverage: if symbol.base_imr > Decimal::ZERO {
            Decimal::ONE / symbol.base_imr
        } else {
            Decimal::ZERO
        },
        min_initial_margin_usd: Decimal::ZERO,
        min_position_size_usd: symbol.min_notional,
        maker_fee: config.maker_fee,
        taker_fee: config.taker_fee,
        price_precision: symbol.quote_tick,
        size_precision: symbol.base_tick,
        supports_limit_orders: true,
        supports_partial_close: true,
    }
}

const fn order_side(side: Side) -> &'static str {
    match side {
        Side::Long => "BUY",
        Side::Short => "SELL",
    }
}

/// Position side an order belongs to: buys build longs unless they reduce.
fn position_side(order_side: &str, reduce_only: bool) -> Side {
    let side = if order_side.eq_ignore_ascii_case("BUY") {
        Side::Long
    } else {
        Side::Short
    };
    if reduce_only { side.opposite() } else { side }
}

/// Stop orders that reduce a position are stop losses when they trigger on
/// the losing side of the mark price.
fn trigger_kind(position: Side, reduce_only: bool, trigger: Decimal, mark: Decimal) -> OrderType {
    if !reduce_only {
        return OrderType::StopLoss;
    }
    let losing = match position {
        Side::Long => trigger < mark,
        Side::Short => trigger > mark,
    };
    if losing {
        OrderType::StopLoss
    } else {
        OrderType::TakeProfit
    }
}

fn millis_to_datetime(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.and_then(DateTime::from_timestamp_millis)
}

pub(crate) fn map_position(market_id: MarketId, row: &PositionRow) -> Option<PositionInfo> {
    if row.position_qty.is_zero() {
        return None;
    }
    let side = if row.position_qty > Decimal::ZERO { Side::Long } else { Side::Short };
    let size_tokens = row.position_qty.abs();
    let margin_usd = size_tokens * row.mark_price * row.imr;
    Some(PositionInfo {
        position_id: row.symbol.clone(),
        market_id,
        side,
        size_tokens,
        size_usd: size_tokens * row.average_open_price,
        margin_usd,
        avg_entry_price: row.average_open_price,
        mark_price: row.mark_price,
        leverage: if row.imr > Decimal::ZERO { Decimal::ONE / row.imr } else { Decimal::ZERO },
        liquidation_price: (row.est_liq_price > Decimal::ZERO).then_some(row.est_liq_price),
        unrealized_pnl: unrealized_pnl(side, size_tokens, row.average_open_price, row.mark_price),
        accrued_funding: Decimal::ZERO,
        accrued_borrowing: Decimal::ZERO,
        collateral_token: USDC.to_string(),
    })
}

pub(crate) fn map_order(market_id: MarketId, row: &OrderRow) -> OrderInfo {
    let remaining = (row.quantity - row.executed).max(Decimal::ZERO);
    let price = row.price.filter(|p| *p > Decimal::ZERO);
    OrderInfo {
        order_id: row.order_id.to_string(),
        market_id,
        side: position_side(&row.side, row.reduce_only),
        order_type: if row.order_type.eq_ignore_ascii_case("MARKET") {
            OrderType::Market
        } else {
            OrderType::Limit
        },
        size_tokens: remaining,
        size_usd: price.map_or(Decimal::ZERO, |p| remaining * p),
        trigger_price: price,
        margin_delta: Decimal::ZERO,
        reduce_only: row.reduce_only,
        status: if row.executed > Decimal::ZERO {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Open
        },
        created_at: millis_to_datetime(row.created_time),
    }
}

pub(crate) fn map_algo_order(market_id: MarketId, row: &AlgoOrderRow, mark: Decimal) -> OrderInfo {
    let side = position_side(&row.side, row.reduce_only);
    let trigger = row.trigger_price.unwrap_or_default();
    OrderInfo {
        order_id: format!("{ALGO_PREFIX}{}", row.algo_order_id),
        market_id,
        side,
        order_type: trigger_kind(side, row.reduce_only, trigger, mark),
        size_tokens: row.quantity,
        size_usd: row.quantity * trigger,
        trigger_price: row.trigger_price,
        margin_delta: Decimal::ZERO,
        reduce_only: row.reduce_only,
        status: OrderStatus::Pending,
        created_at: millis_to_datetime(row.created_time),
    }
}

// ============================================================================
// Previews
// ============================================================================

pub(crate) fn open_preview(
    order: &CreateOrder,
    existing: Option<&PositionInfo>,
    market: &OrderlyMarket,
    price: Decimal,
) -> OpenTradePreview {
    let added_tokens = round_down_to_step(order.size_tokens_at(price), market.symbol.base_tick);
    let fee = added_tokens * price * market.info.taker_fee;
    let (base_tokens, base_margin) = existing
        .filter(|p| p.side == order.side)
        .map_or((Decimal::ZERO, Decimal::ZERO), |p| (p.size_tokens, p.margin_usd));
    let size_tokens = base_tokens + added_tokens;
    let notional = size_tokens * price;
    let required = notional * market.symbol.initial_margin_ratio(notional);
    let margin_usd = if order.margin_delta > Decimal::ZERO {
        base_margin + order.margin_delta
    } else {
        required
    };
    let equity = margin_usd - fee;

    let preview = OpenTradePreview {
        market_id: order.market_id.clone(),
        side: order.side,
        size_tokens,
        size_usd: notional,
        margin_usd,
        leverage: if margin_usd > Decimal::ZERO { notional / margin_usd } else { Decimal::ZERO },
        avg_entry_price: price,
        liquidation_price: linear_liquidation_price(
            order.side,
            size_tokens,
            price,
            equity,
            market.symbol.maintenance_margin_ratio(notional),
        ),
        fee_usd: fee,
        is_valid: true,
        error_message: None,
    };

    if existing.is_some_and(|p| p.side != order.side) && !order.reduce_only {
        return preview.invalid("an opposite position is open in this market");
    }
    if let Err(err) = validate_create_order(order, &market.info, price, order.margin_delta) {
        return preview.invalid(err.to_string());
    }
    if added_tokens < market.symbol.base_min {
        return preview.invalid(format!(
            "quantity {added_tokens} is below the minimum {}",
            market.symbol.base_min
        ));
    }
    if margin_usd < required {
        return preview.invalid(format!(
            "margin {margin_usd} USD is below the initial requirement {required} USD"
        ));
    }
    preview
}

pub(crate) fn close_preview(position: &PositionInfo, close: &ClosePosition, market: &OrderlyMarket) -> CloseTradePreview {
    let price = close.trigger_price.unwrap_or(position.mark_price);
    let closed = close.close_size.min(position.size_tokens);
    let fraction = if position.size_tokens.is_zero() {
        Decimal::ONE
    } else {
        closed / position.size_tokens
    };
    let fee = closed * price * market.info.taker_fee;
    let realized = unrealized_pnl(position.side, closed, position.avg_entry_price, price);
    let remaining_tokens = position.size_tokens - closed;
    let remaining_margin = position.margin_usd * (Decimal::ONE - fraction);
    let remaining_notional = remaining_tokens * price;

    let mut preview = CloseTradePreview {
        market_id: position.market_id.clone(),
        side: position.side,
        remaining_size_tokens: remaining_tokens,
        remaining_margin_usd: remaining_margin,
        leverage: if remaining_margin > Decimal::ZERO {
            remaining_notional / remaining_margin
        } else {
            Decimal::ZERO
        },
        liquidation_price: linear_liquidation_price(
            position.side,
            remaining_tokens,
            price,
            remaining_margin,
            market.symbol.maintenance_margin_ratio(remaining_notional),
        ),
        realized_pnl: realized,
        received_margin_usd: (position.margin_usd * fraction + realized - fee).max(Decimal::ZERO),
        fee_usd: fee,
        is_valid: true,
        error_message: None,
    };
    if let Err(err) = validate_close(close, position) {
        preview.is_valid = false;
        preview.error_message = Some(err.to_string());
    }
    preview
}

#[async_trait]
impl PerpsAdapter for OrderlyAdapter {
    fn protocol_id(&self) -> ProtocolId {
        ProtocolId::Orderly
    }

    fn supported_chains(&self) -> Vec<Chain> {
        vec![self.chain]
    }

    async fn setup(&self, wallet: Address) -> AdapterResult<Vec<RouterOutput>> {
        ensure_wallet(ProtocolId::Orderly, self.config.account_address, wallet)?;
        let mut outputs = Vec::new();
        let timestamp = now_millis();

        if !self.is_registered(wallet).await? {
            let nonce = self
                .public
                .get_public::<Envelope<RegistrationNonce>>("/v1/registration_nonce")
                .await?
                .into_data()?
                .registration_nonce;
            let nonce: U256 = nonce
                .parse()
                .map_err(|_| AdapterError::Http(HttpError::JsonParse(format!("invalid registration nonce {nonce}"))))?;
            outputs.push(RouterOutput::TypedData(typed_data::registration(
                &self.domain,
                &self.config.broker_id,
                self.chain.id(),
                timestamp,
                nonce,
            )));
        }

        match &self.orderly_key {
            Some(key) => {
                if !self.key_is_active(key).await? {
                    let lifetime = Duration::days(self.config.key_expiration_days);
                    let expiration = timestamp + u64::try_from(lifetime.num_milliseconds()).unwrap_or_default();
                    outputs.push(RouterOutput::TypedData(typed_data::add_orderly_key(
                        &self.domain,
                        &self.config.broker_id,
                        self.chain.id(),
                        key,
                        timestamp,
                        expiration,
                    )));
                }
            }
            None => tracing::warn!(wallet = %wallet, "No Orderly key configured, skipping key registration"),
        }

        tracing::info!(wallet = %wallet, payloads = outputs.len(), "Prepared Orderly setup");
        Ok(outputs)
    }

    async fn get_all_markets(&self) -> AdapterResult<Vec<MarketInfo>> {
        Ok(self.load_markets().await?.iter().map(|m| m.info.clone()).collect())
    }

    async fn get_market_prices(&self, market_ids: &[MarketId]) -> AdapterResult<Vec<Decimal>> {
        let futures = self.load_futures().await?;
        market_ids
            .iter()
            .map(|id| {
                futures
                    .iter()
                    .find(|f| id.protocol() == ProtocolId::Orderly && f.symbol == id.native_id())
                    .map(|f| f.mark_price)
                    .ok_or_else(|| AdapterError::MarketNotFound(id.to_string()))
            })
            .collect()
    }

    async fn get_markets_state(&self, market_ids: &[MarketId]) -> AdapterResult<Vec<MarketState>> {
        let futures = self.load_futures().await?;
        market_ids
            .iter()
            .map(|id| {
                let f = futures
                    .iter()
                    .find(|f| id.protocol() == ProtocolId::Orderly && f.symbol == id.native_id())
                    .ok_or_else(|| AdapterError::MarketNotFound(id.to_string()))?;
                let open_interest = f.open_interest * f.mark_price;
                let hourly = f.est_funding_rate / FUNDING_PERIOD_HOURS;
                Ok(MarketState {
                    market_id: id.clone(),
                    price: f.mark_price,
                    long_open_interest_usd: open_interest,
                    short_open_interest_usd: open_interest,
                    long_funding_rate: hourly,
                    short_funding_rate: -hourly,
                    long_borrow_rate: Decimal::ZERO,
                    short_borrow_rate: Decimal::ZERO,
                    available_liquidity_usd: None,
                })
            })
            .collect()
    }

    async fn create_order(&self, wallet: Address, orders: &[CreateOrder]) -> AdapterResult<Vec<RouterOutput>> {
        let client = self.account(wallet)?;
        let (markets, futures, account) =
            tokio::try_join!(self.load_markets(), self.load_futures(), self.load_positions(client))?;
        let mut free_collateral = account.free_collateral;
        let mut outputs = Vec::with_capacity(orders.len());

        for order in orders {
            let market = self.resolve(&markets, &order.market_id)?;
            let mark = futures
                .iter()
                .find(|f| f.symbol == market.symbol.symbol)
                .map_or(Decimal::ZERO, |f| f.mark_price);
            let reference = order.trigger_price.unwrap_or(mark);
            validate_create_order(order, &market.info, reference, order.margin_delta)?;

            let quantity = round_down_to_step(order.size_tokens_at(reference), market.symbol.base_tick);
            if quantity < market.symbol.base_min {
                return Err(AdapterError::Validation(format!(
                    "quantity {quantity} is below the {} minimum {}",
                    market.symbol.symbol, market.symbol.base_min
                )));
            }

            if !order.reduce_only {
                let notional = quantity * reference;
                let required = notional * market.symbol.initial_margin_ratio(notional) + notional * market.info.taker_fee;
                ensure_sufficient_balance(USDC, required, free_collateral)?;
                free_collateral -= required;
            }

            tracing::info!(
                wallet = %wallet,
                market = %order.market_id,
                side = %order.side,
                order_type = ?order.order_type,
                quantity = %quantity,
                "Submitting Orderly order"
            );
            outputs.push(
                self.submit(
                    client,
                    market,
                    order_side(order.side),
                    order.order_type,
                    quantity,
                    order.trigger_price,
                    order.reduce_only,
                )
                .await?,
            );
        }
        Ok(outputs)
    }

    async fn update_order(&self, wallet: Address, orders: &[UpdateOrder]) -> AdapterResult<Vec<RouterOutput>> {
        let client = self.account(wallet)?;
        let needs_rows = orders.iter().any(|o| !o.order_id.starts_with(ALGO_PREFIX));
        let (markets, open) = tokio::try_join!(self.load_markets(), async {
            if needs_rows {
                self.load_open_orders(client).await
            } else {
                Ok(Vec::new())
            }
        })?;
        let mut outputs = Vec::with_capacity(orders.len());

        for update in orders {
            let market = self.resolve(&markets, &update.market_id)?;
            if update.trigger_price <= Decimal::ZERO {
                return Err(AdapterError::Validation("trigger price must be positive".to_string()));
            }
            if update.size_delta <= Decimal::ZERO {
                return Err(AdapterError::Validation("order size must be positive".to_string()));
            }
            let size_tokens = if update.size_in_usd {
                update.size_delta / update.trigger_price
            } else {
                update.size_delta
            };
            let quantity = round_down_to_step(size_tokens, market.symbol.base_tick);
            let price = round_down_to_step(update.trigger_price, market.symbol.quote_tick);
            if quantity < market.symbol.base_min || quantity <= Decimal::ZERO {
                return Err(AdapterError::Validation(format!(
                    "quantity {quantity} is below the {} minimum {}",
                    market.symbol.symbol, market.symbol.base_min
                )));
            }
            if price <= Decimal::ZERO {
                return Err(AdapterError::Validation(format!(
                    "price is below the {} tick {}",
                    market.symbol.symbol, market.symbol.quote_tick
                )));
            }

            tracing::info!(order_id = %update.order_id, market = %update.market_id, "Editing Orderly order");
            if let Some(algo_id) = update.order_id.strip_prefix(ALGO_PREFIX) {
                let body = EditAlgoOrder {
                    order_id: algo_id.to_string(),
                    quantity,
                    trigger_price: price,
                };
                client.put::<Envelope<Ack>, _>("/v1/algo/order", &body).await?.into_data()?;
            } else {
                // The listed side is the position side; edits take the venue's order side.
                let current = open
                    .iter()
                    .find(|row| row.order_id.to_string() == update.order_id)
                    .ok_or_else(|| {
                        AdapterError::Validation(format!(
                            "Orderly order {} is not open",
                            update.order_id
                        ))
                    })?;
                let body = EditOrder {
                    order_id: update.order_id.clone(),
                    symbol: market.symbol.symbol.clone(),
                    order_type: "LIMIT",
                    order_price: price,
                    order_quantity: quantity,
                    side: if current.side.eq_ignore_ascii_case("BUY") {
                        "BUY"
                    } else {
                        "SELL"
                    },
                };
                client.put::<Envelope<Ack>, _>("/v1/order", &body).await?.into_data()?;
            }
            outputs.push(RouterOutput::ApiAck {
                protocol: ProtocolId::Orderly,
                reference: update.order_id.clone(),
                message: format!("edited to {quantity} @ {price}"),
            });
        }
        Ok(outputs)
    }

    async fn cancel_order(&self, wallet: Address, orders: &[CancelOrder]) -> AdapterResult<Vec<RouterOutput>> {
        let client = self.account(wallet)?;
        let mut outputs = Vec::with_capacity(orders.len());

        for cancel in orders {
            let symbol = cancel.market_id.native_id();
            let path = match cancel.order_id.strip_prefix(ALGO_PREFIX) {
                Some(algo_id) => format!("/v1/algo/order?order_id={algo_id}&symbol={symbol}"),
                None => format!("/v1/order?order_id={}&symbol={symbol}", cancel.order_id),
            };
            tracing::info!(order_id = %cancel.order_id, market = %cancel.market_id, "Canceling Orderly order");
            let ack = client.delete::<Envelope<Ack>>(&path).await?.into_data()?;
            outputs.push(RouterOutput::ApiAck {
                protocol: ProtocolId::Orderly,
                reference: cancel.order_id.clone(),
                message: ack.status.unwrap_or_else(|| "CANCEL_SENT".to_string()),
            });
        }
        Ok(outputs)
    }

    async fn close_position(
        &self,
        wallet: Address,
        positions: &[PositionInfo],
        closes: &[ClosePosition],
    ) -> AdapterResult<Vec<RouterOutput>> {
        ensure_paired(positions, closes, "closes")?;
        let client = self.account(wallet)?;
        let markets = self.load_markets().await?;
        let mut outputs = Vec::with_capacity(closes.len());

        for (position, close) in positions.iter().zip(closes) {
            validate_close(close, position)?;
            let market = self.resolve(&markets, &position.market_id)?;
            let quantity = if close.is_full_close(position) {
                position.size_tokens
            } else {
                round_down_to_step(close.close_size, market.symbol.base_tick)
            };

            tracing::info!(
                wallet = %wallet,
                market = %position.market_id,
                quantity = %quantity,
                order_type = ?close.order_type,
                "Closing Orderly position"
            );
            outputs.push(
                self.submit(
                    client,
                    market,
                    order_side(position.side.opposite()),
                    close.order_type,
                    quantity,
                    close.trigger_price,
                    true,
                )
                .await?,
            );
        }
        Ok(outputs)
    }

    async fn get_all_positions(&self, wallet: Address) -> AdapterResult<Vec<PositionInfo>> {
        let client = self.account(wallet)?;
        let data = self.load_positions(client).await?;
        Ok(data
            .rows
            .iter()
            .filter_map(|row| map_position(self.market_id(&row.symbol), row))
            .collect())
    }

    async fn get_all_orders(&self, wallet: Address) -> AdapterResult<Vec<OrderInfo>> {
        let client = self.account(wallet)?;
        let (orders, algo, futures) = tokio::try_join!(
            self.load_open_orders(client),
            async {
                client
                    .get::<Envelope<Rows<AlgoOrderRow>>>("/v1/algo/orders?status=INCOMPLETE")
                    .await?
                    .into_data()
            },
            self.load_futures(),
        )?;

        let mark = |symbol: &str| {
            futures
                .iter()
                .find(|f| f.symbol == symbol)
                .map_or(Decimal::ZERO, |f| f.mark_price)
        };
        let mut result: Vec<OrderInfo> = orders
            .iter()
            .map(|row| map_order(self.market_id(&row.symbol), row))
            .collect();
        result.extend(
            algo.rows
                .iter()
                .map(|row| map_algo_order(self.market_id(&row.symbol), row, mark(&row.symbol))),
        );
        Ok(result)
    }

    async fn get_account_info(&self, wallet: Address) -> AdapterResult<AccountInfo> {
        let client = self.account(wallet)?;
        let (positions, holding) = tokio::try_join!(self.load_positions(client), self.load_holding(client))?;
        Ok(AccountInfo {
            protocol: ProtocolId::Orderly,
            wallet,
            total_collateral_usd: positions.total_collateral_value,
            free_collateral_usd: positions.free_collateral,
            margin_ratio: positions.current_margin_ratio_with_orders,
            balances: holding
                .holding
                .into_iter()
                .map(|h| TokenBalance {
                    token: h.token,
                    amount: h.holding,
                    locked: h.frozen,
                })
                .collect(),
        })
    }

    async fn get_open_trade_preview(
        &self,
        _wallet: Address,
        orders: &[CreateOrder],
        existing: &[Option<PositionInfo>],
    ) -> AdapterResult<Vec<OpenTradePreview>> {
        ensure_paired(orders, existing, "existing positions")?;
        let (markets, futures) = tokio::try_join!(self.load_markets(), self.load_futures())?;
        orders
            .iter()
            .zip(existing)
            .map(|(order, current)| {
                let market = self.resolve(&markets, &order.market_id)?;
                let mark = futures
                    .iter()
                    .find(|f| f.symbol == market.symbol.symbol)
                    .map_or(Decimal::ZERO, |f| f.mark_price);
                Ok(open_preview(order, current.as_ref(), market, order.trigger_price.unwrap_or(mark)))
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
        let markets = self.load_markets().await?;
        positions
            .iter()
            .zip(closes)
            .map(|(position, close)| Ok(close_preview(position, close, self.resolve(&markets, &position.market_id)?)))
            .collect()
    }

    async fn deposit(&self, wallet: Address, token: &str, amount: Decimal) -> AdapterResult<Vec<RouterOutput>> {
        ensure_wallet(ProtocolId::Orderly, self.config.account_address, wallet)?;
        if !token.eq_ignore_ascii_case(USDC) {
            return Err(AdapterError::Validation(format!("Orderly accepts {USDC} deposits, not {token}")));
        }
        if amount <= Decimal::ZERO {
            return Err(AdapterError::Validation("deposit amount must be positive".to_string()));
        }

        let required = to_units(amount, USDC_DECIMALS)?;
        let balance = erc20::balance_of(&self.rpc, self.config.usdc, wallet).await?;
        ensure_sufficient_balance(USDC, amount, from_units(balance, USDC_DECIMALS)?)?;

        let data = VaultDepositFE {
            accountId: self.account_id,
            brokerHash: keccak256(self.config.broker_id.as_bytes()),
            tokenHash: keccak256(USDC.as_bytes()),
            tokenAmount: u128::try_from(required)
                .map_err(|_| AdapterError::Conversion(format!("deposit amount {amount} overflows uint128")))?,
        };
        let fee = self
            .rpc
            .call(self.config.vault, &IVault::getDepositFeeCall { receiver: wallet, data: data.clone() })
            .await?
            ._0;

        let mut outputs: Vec<RouterOutput> = erc20::approval_if_needed(
            &self.rpc,
            self.chain,
            self.config.usdc,
            USDC,
            wallet,
            self.config.vault,
            required,
        )
        .await?
        .into_iter()
        .map(RouterOutput::Transaction)
        .collect();

        tracing::info!(wallet = %wallet, amount = %amount, fee = %fee, "Prepared Orderly deposit");
        outputs.push(RouterOutput::Transaction(UnsignedTx {
            chain: self.chain,
            to: self.config.vault,
            data: IVault::depositCall { data }.abi_encode().into(),
            value: fee,
            heading: format!("Deposit {USDC}"),
            description: format!("Deposit {amount} {USDC} into Orderly"),
        }));
        Ok(outputs)
    }

    async fn withdraw(&self, wallet: Address, token: &str, amount: Decimal) -> AdapterResult<Vec<RouterOutput>> {
        let client = self.account(wallet)?;
        if !token.eq_ignore_ascii_case(USDC) {
            return Err(AdapterError::Validation(format!("Orderly withdraws {USDC}, not {token}")));
        }
        if amount <= Decimal::ZERO {
            return Err(AdapterError::Validation("withdraw amount must be positive".to_string()));
        }

        let (holding, nonce) = tokio::try_join!(self.load_holding(client), async {
            client
                .get::<Envelope<WithdrawNonce>>("/v1/withdraw_nonce")
                .await?
                .into_data()
        })?;
        let available = holding
            .holding
            .iter()
            .find(|h| h.token.eq_ignore_ascii_case(USDC))
            .map_or(Decimal::ZERO, |h| (h.holding - h.frozen).max(Decimal::ZERO));
        ensure_sufficient_balance(USDC, amount, available)?;

        tracing::info!(wallet = %wallet, amount = %amount, nonce = nonce.withdraw_nonce, "Prepared Orderly withdrawal");
        Ok(vec![RouterOutput::TypedData(typed_data::withdraw(
            &self.domain,
            &self.config.broker_id,
            self.chain.id(),
            wallet,
            USDC,
            to_units(amount, USDC_DECIMALS)?,
            nonce.withdraw_nonce,
            now_millis(),
        ))])
    }
}
