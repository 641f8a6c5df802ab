//! Aevo Adapter
//!
//! Off-chain order book on the Aevo L2. Requests are authenticated with an
//! API key HMAC and every order carries an EIP-712 signature from the
//! account's registered signing key, so writes go straight to the venue and
//! return [`RouterOutput::ApiAck`]. Deposits and withdrawals run through the
//! Aevo bridge and are not exposed here.

use std::sync::Arc;

use alloy::sol_types::Eip712Domain;
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use rust_decimal::Decimal;

use super::api_types::{Account, AccountPosition, Funding, Market, NewOrder, OpenOrder, OrderAck};
use super::auth::AevoAuth;
use super::config::AevoConfig;
use super::typed_data::{ORDER_DECIMALS, OrderParams, order_domain};
use crate::application::validation::{ensure_sufficient_balance, validate_close, validate_create_order};
use crate::application::{AdapterResult, PerpsAdapter, ports::ensure_paired};
use crate::config::{CacheConfig, HttpSettings};
use crate::domain::{
    AccountInfo, CancelOrder, Chain, ClosePosition, CloseTradePreview, CreateOrder, MarketId, MarketInfo,
    MarketState, OpenTradePreview, OrderInfo, OrderStatus, OrderType, PositionInfo, ProtocolId, RouterOutput,
    Side, TokenBalance, TokenInfo, UpdateOrder, unrealized_pnl,
};
use crate::error::AdapterError;
use crate::infrastructure::cache::TimedCache;
use crate::infrastructure::evm::{LocalSigner, to_units};
use crate::infrastructure::http::JsonHttpClient;
use crate::infrastructure::protocols::common::{ensure_wallet, linear_liquidation_price, round_down_to_step};

const USDC: &str = "USDC";
const USDC_DECIMALS: u8 = 6;
const PERPETUAL: &str = "PERPETUAL";
/// Maintenance margin as a share of the initial requirement.
const MAINTENANCE_SHARE: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Market with the instrument data needed to sign orders.
#[derive(Debug, Clone)]
pub(crate) struct AevoMarket {
    pub info: MarketInfo,
    pub market: Market,
}

impl AevoMarket {
    fn initial_margin_ratio(&self) -> Decimal {
        if self.info.max_leverage > Decimal::ZERO {
            Decimal::ONE / self.info.max_leverage
        } else {
            Decimal::ONE
        }
    }

    fn maintenance_margin_ratio(&self) -> Decimal {
        self.initial_margin_ratio() * MAINTENANCE_SHARE
    }
}

/// Order to sign and submit.
#[derive(Debug, Clone, Copy)]
struct Submission {
    is_buy: bool,
    order_type: OrderType,
    amount: Decimal,
    price: Option<Decimal>,
    slippage: Decimal,
    reduce_only: bool,
}

/// Aevo adapter.
#[derive(Debug)]
pub struct AevoAdapter {
    config: AevoConfig,
    chain: Chain,
    public: JsonHttpClient,
    private: Option<JsonHttpClient>,
    signer: Option<LocalSigner>,
    domain: Eip712Domain,
    markets: TimedCache<(), Arc<Vec<AevoMarket>>>,
    funding: TimedCache<String, Decimal>,
}

impl AevoAdapter {
    /// Build the adapter. Account endpoints need `api_key` and `api_secret`;
    /// order placement also needs `signing_key`.
    pub fn new(config: AevoConfig, http: &HttpSettings, cache: &CacheConfig) -> AdapterResult<Self> {
        let chain = Chain::new(config.domain_chain_id());
        let client_config = http.client_config(&config.base_url);

        let private = match (config.api_key.as_deref(), config.api_secret.as_deref()) {
            (Some(key), Some(secret)) => Some(JsonHttpClient::new(
                &client_config,
                Arc::new(AevoAuth::new(key, secret)),
            )?),
            _ => None,
        };
        let signer = config.signing_key.as_deref().map(LocalSigner::from_hex).transpose()?;

        tracing::info!(
            chain = %chain,
            wallet = %config.wallet_address,
            testnet = config.testnet,
            authenticated = private.is_some(),
            can_sign = signer.is_some(),
            "Aevo adapter initialized"
        );

        Ok(Self {
            chain,
            public: JsonHttpClient::public(&client_config)?,
            private,
            signer,
            domain: order_domain(config.testnet),
            markets: TimedCache::new("aevo_markets", cache.prices.policy()),
            funding: TimedCache::new("aevo_funding", cache.state.policy()),
            config,
        })
    }

    // ========================================================================
    // Clients
    // ========================================================================

    fn account(&self, wallet: Address) -> AdapterResult<&JsonHttpClient> {
        ensure_wallet(ProtocolId::Aevo, self.config.wallet_address, wallet)?;
        self.private
            .as_ref()
            .ok_or_else(|| AdapterError::Config("api_key and api_secret are required for Aevo account endpoints".to_string()))
    }

    fn trader(&self, wallet: Address) -> AdapterResult<(&JsonHttpClient, &LocalSigner)> {
        let client = self.account(wallet)?;
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| AdapterError::Config("signing_key is required to place Aevo orders".to_string()))?;
        Ok((client, signer))
    }

    // ========================================================================
    // Loaders
    // ========================================================================

    async fn load_markets(&self) -> AdapterResult<Arc<Vec<AevoMarket>>> {
        self.markets
            .get_or_fetch((), || async move {
                let rows = self
                    .public
                    .get_public::<Vec<Market>>("/markets?instrument_type=PERPETUAL")
                    .await?;
                let markets: Vec<_> = rows
                    .into_iter()
                    .filter(|m| m.is_active && m.instrument_type == PERPETUAL)
                    .map(|market| AevoMarket {
                        info: market_info(self.chain, &market, &self.config),
                        market,
                    })
                    .collect();
                tracing::debug!(count = markets.len(), "Loaded Aevo markets");
                Ok::<_, AdapterError>(Arc::new(markets))
            })
            .await
    }

    async fn load_funding(&self, instrument: &str) -> AdapterResult<Decimal> {
        self.funding
            .get_or_fetch(instrument.to_string(), || async move {
                let funding = self
                    .public
                    .get_public::<Funding>(&format!("/funding?instrument_name={instrument}"))
                    .await?;
                Ok::<_, AdapterError>(funding.funding_rate)
            })
            .await
    }

    async fn load_account(&self, client: &JsonHttpClient) -> AdapterResult<Account> {
        Ok(client.get::<Account>("/account").await?)
    }

    async fn load_orders(&self, client: &JsonHttpClient) -> AdapterResult<Vec<OpenOrder>> {
        Ok(client.get::<Vec<OpenOrder>>("/orders").await?)
    }

    fn resolve<'a>(&self, markets: &'a [AevoMarket], id: &MarketId) -> AdapterResult<&'a AevoMarket> {
        if id.protocol() != ProtocolId::Aevo || id.chain() != self.chain {
            return Err(AdapterError::MarketNotFound(id.to_string()));
        }
        markets
            .iter()
            .find(|m| m.market.instrument_name == id.native_id())
            .ok_or_else(|| AdapterError::MarketNotFound(id.to_string()))
    }

    fn market_id(&self, instrument: &str) -> MarketId {
        MarketId::new(self.chain, ProtocolId::Aevo, instrument)
    }

    // ========================================================================
    // Submission
    // ========================================================================

    async fn submit(
        &self,
        client: &JsonHttpClient,
        signer: &LocalSigner,
        market: &AevoMarket,
        order: Submission,
    ) -> AdapterResult<RouterOutput> {
        let body = self.sign_now(signer, market, order)?;
        self.post_order(client, market, order, &body).await
    }

    fn sign_now(
        &self,
        signer: &LocalSigner,
        market: &AevoMarket,
        order: Submission,
    ) -> AdapterResult<NewOrder> {
        let salt = rand::random::<u64>();
        self.signed_order(signer, market, order, Utc::now().timestamp(), salt)
    }

    async fn post_order(
        &self,
        client: &JsonHttpClient,
        market: &AevoMarket,
        order: Submission,
        body: &NewOrder,
    ) -> AdapterResult<RouterOutput> {
        let ack = client.post::<OrderAck, _>("/orders", body).await?;

        tracing::info!(
            order_id = %ack.order_id,
            market = %market.info.market_id,
            is_buy = order.is_buy,
            amount = %order.amount,
            "Aevo order accepted"
        );
        Ok(RouterOutput::ApiAck {
            protocol: ProtocolId::Aevo,
            reference: ack.order_id,
            message: format!(
                "{} {} {}",
                if order.is_buy { "buy" } else { "sell" },
                order.amount,
                market.market.instrument_name
            ),
        })
    }

    fn signed_order(
        &self,
        signer: &LocalSigner,
        market: &AevoMarket,
        order: Submission,
        timestamp: i64,
        salt: u64,
    ) -> AdapterResult<NewOrder> {
        let step = market.market.price_step;
        let (limit, time_in_force, stop, trigger) = match order.order_type {
            OrderType::Market => (
                protective_price(order.is_buy, market.market.mark_price, order.slippage, step),
                "IOC",
                None,
                None,
            ),
            OrderType::Limit => {
                let price = order
                    .price
                    .ok_or_else(|| AdapterError::Validation("limit order requires a price".to_string()))?;
                (round_down_to_step(price, step), "GTC", None, None)
            }
            OrderType::StopLoss | OrderType::TakeProfit => {
                let trigger = order.price.ok_or_else(|| {
                    AdapterError::Validation(format!("{:?} requires a trigger price", order.order_type))
                })?;
                let kind = if order.order_type == OrderType::StopLoss { "STOP_LOSS" } else { "TAKE_PROFIT" };
                (
                    protective_price(order.is_buy, trigger, order.slippage, step),
                    "GTC",
                    Some(kind),
                    Some(round_down_to_step(trigger, step)),
                )
            }
        };

        let timestamp = u64::try_from(timestamp)
            .map_err(|_| AdapterError::Conversion(format!("invalid order timestamp {timestamp}")))?;
        let instrument: U256 = market.market.instrument_id.parse().map_err(|_| {
            AdapterError::Conversion(format!("invalid Aevo instrument id {}", market.market.instrument_id))
        })?;
        let params = OrderParams {
            maker: self.config.wallet_address,
            is_buy: order.is_buy,
            limit_price: to_units(limit, ORDER_DECIMALS)?,
            amount: to_units(order.amount, ORDER_DECIMALS)?,
            salt: U256::from(salt),
            instrument,
            timestamp,
        };
        let signature = params.sign(signer, &self.domain)?;

        Ok(NewOrder {
            maker: self.config.wallet_address.to_checksum(None),
            is_buy: order.is_buy,
            instrument: instrument.to_string(),
            limit_price: params.limit_price.to_string(),
            amount: params.amount.to_string(),
            salt: params.salt.to_string(),
            signature,
            timestamp: timestamp.to_string(),
            post_only: false,
            reduce_only: order.reduce_only,
            time_in_force,
            stop,
            trigger: trigger.map(|t| to_units(t, ORDER_DECIMALS)).transpose()?.map(|t| t.to_string()),
        })
    }
}

// ============================================================================
// Mapping
// ============================================================================

fn market_info(chain: Chain, market: &Market, config: &AevoConfig) -> MarketInfo {
    let usdc = vec![TokenInfo::off_chain(USDC, USDC_DECIMALS)];
    MarketInfo {
        market_id: MarketId::new(chain, ProtocolId::Aevo, market.instrument_name.clone()),
        protocol: ProtocolId::Aevo,
        chain,
        index_token: TokenInfo::off_chain(
            market.underlying_asset.clone(),
            u8::try_from(market.amount_step.scale()).unwrap_or(ORDER_DECIMALS),
        ),
        long_collateral: usdc.clone(),
        short_collateral: usdc,
        min_leverage: Decimal::ZERO,
        max_leverage: market
            .max_leverage
            .filter(|l| *l > Decimal::ZERO)
            .unwrap_or(config.default_max_leverage),
        min_initial_margin_usd: Decimal::ZERO,
        min_position_size_usd: market.min_order_value,
        maker_fee: config.maker_fee,
        taker_fee: config.taker_fee,
        price_precision: market.price_step,
        size_precision: market.amount_step,
        supports_limit_orders: true,
        supports_partial_close: true,
    }
}

/// Worst acceptable fill for an order that should execute now: buys cap the
/// price above the reference, sells floor it below.
fn protective_price(is_buy: bool, reference: Decimal, slippage: Decimal, step: Decimal) -> Decimal {
    if is_buy {
        let bound = reference * (Decimal::ONE + slippage);
        if step > Decimal::ZERO {
            ((bound / step).ceil() * step).normalize()
        } else {
            bound
        }
    } else {
        round_down_to_step(reference * (Decimal::ONE - slippage), step)
    }
}

fn is_buy(side: &str) -> bool {
    side.eq_ignore_ascii_case("buy")
}

fn position_side(order_side: &str, reduce_only: bool) -> Side {
    let side = if is_buy(order_side) { Side::Long } else { Side::Short };
    if reduce_only { side.opposite() } else { side }
}

fn nanos_to_datetime(nanos: Option<&str>) -> Option<DateTime<Utc>> {
    let nanos: i64 = nanos?.parse().ok()?;
    let secs = nanos.div_euclid(1_000_000_000);
    let sub = u32::try_from(nanos.rem_euclid(1_000_000_000)).ok()?;
    DateTime::from_timestamp(secs, sub)
}

/// Notional of all perpetual positions at mark.
fn total_notional(account: &Account) -> Decimal {
    account
        .positions
        .iter()
        .filter(|p| p.instrument_type == PERPETUAL)
        .map(|p| p.amount.abs() * p.mark_price)
        .sum()
}

/// Map a position. Cross positions get a share of the account's initial
/// margin proportional to their notional.
pub(crate) fn map_position(
    market_id: MarketId,
    row: &AccountPosition,
    account_initial_margin: Decimal,
    account_notional: Decimal,
) -> Option<PositionInfo> {
    if row.amount.is_zero() || row.instrument_type != PERPETUAL {
        return None;
    }
    let side = if is_buy(&row.side) { Side::Long } else { Side::Short };
    let size_tokens = row.amount.abs();
    let notional = size_tokens * row.mark_price;
    let margin_usd = row.isolated_margin.unwrap_or_else(|| {
        if account_notional > Decimal::ZERO {
            account_initial_margin * notional / account_notional
        } else {
            Decimal::ZERO
        }
    });
    Some(PositionInfo {
        position_id: row.instrument_name.clone(),
        market_id,
        side,
        size_tokens,
        size_usd: size_tokens * row.avg_entry_price,
        margin_usd,
        avg_entry_price: row.avg_entry_price,
        mark_price: row.mark_price,
        leverage: if margin_usd > Decimal::ZERO { notional / margin_usd } else { Decimal::ZERO },
        liquidation_price: row.liquidation_price.filter(|p| *p > Decimal::ZERO),
        unrealized_pnl: row.unrealized_pnl,
        accrued_funding: Decimal::ZERO,
        accrued_borrowing: Decimal::ZERO,
        collateral_token: USDC.to_string(),
    })
}

pub(crate) fn map_order(market_id: MarketId, row: &OpenOrder) -> OrderInfo {
    let remaining = (row.amount - row.filled).max(Decimal::ZERO);
    let order_type = match row.stop.as_deref() {
        Some("STOP_LOSS") => OrderType::StopLoss,
        Some("TAKE_PROFIT") => OrderType::TakeProfit,
        _ if row.order_type.eq_ignore_ascii_case("market") => OrderType::Market,
        _ => OrderType::Limit,
    };
    let trigger_price = row.trigger.or(Some(row.price)).filter(|p| *p > Decimal::ZERO);
    OrderInfo {
        order_id: row.order_id.clone(),
        market_id,
        side: position_side(&row.side, row.reduce_only),
        order_type,
        size_tokens: remaining,
        size_usd: trigger_price.map_or(Decimal::ZERO, |p| remaining * p),
        trigger_price,
        margin_delta: Decimal::ZERO,
        reduce_only: row.reduce_only,
        status: if row.stop.is_some() {
            OrderStatus::Pending
        } else if row.filled > Decimal::ZERO {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Open
        },
        created_at: nanos_to_datetime(row.created_timestamp.as_deref()),
    }
}

// ============================================================================
// Previews
// ============================================================================

pub(crate) fn open_preview(
    order: &CreateOrder,
    existing: Option<&PositionInfo>,
    market: &AevoMarket,
    price: Decimal,
) -> OpenTradePreview {
    let added_tokens = round_down_to_step(order.size_tokens_at(price), market.market.amount_step);
    let fee = added_tokens * price * market.info.taker_fee;
    let (base_tokens, base_margin) = existing
        .filter(|p| p.side == order.side)
        .map_or((Decimal::ZERO, Decimal::ZERO), |p| (p.size_tokens, p.margin_usd));
    let size_tokens = base_tokens + added_tokens;
    let notional = size_tokens * price;
    let required = notional * market.initial_margin_ratio();
    let margin_usd = if order.margin_delta > Decimal::ZERO {
        base_margin + order.margin_delta
    } else {
        required
    };

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
            margin_usd - fee,
            market.maintenance_margin_ratio(),
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
    if added_tokens.is_zero() && order.size_delta > Decimal::ZERO {
        return preview.invalid(format!("size is below the amount step {}", market.market.amount_step));
    }
    if margin_usd < required {
        return preview.invalid(format!(
            "margin {margin_usd} USD is below the initial requirement {required} USD"
        ));
    }
    preview
}

pub(crate) fn close_preview(position: &PositionInfo, close: &ClosePosition, market: &AevoMarket) -> CloseTradePreview {
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
            market.maintenance_margin_ratio(),
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
impl PerpsAdapter for AevoAdapter {
    fn protocol_id(&self) -> ProtocolId {
        ProtocolId::Aevo
    }

    fn supported_chains(&self) -> Vec<Chain> {
        vec![self.chain]
    }

    async fn get_all_markets(&self) -> AdapterResult<Vec<MarketInfo>> {
        Ok(self.load_markets().await?.iter().map(|m| m.info.clone()).collect())
    }

    async fn get_market_prices(&self, market_ids: &[MarketId]) -> AdapterResult<Vec<Decimal>> {
        let markets = self.load_markets().await?;
        market_ids
            .iter()
            .map(|id| Ok(self.resolve(&markets, id)?.market.mark_price))
            .collect()
    }

    async fn get_markets_state(&self, market_ids: &[MarketId]) -> AdapterResult<Vec<MarketState>> {
        let markets = self.load_markets().await?;
        let resolved = market_ids
            .iter()
            .map(|id| self.resolve(&markets, id))
            .collect::<AdapterResult<Vec<_>>>()?;
        let rates = try_join_all(resolved.iter().map(|m| self.load_funding(&m.market.instrument_name))).await?;

        Ok(market_ids
            .iter()
            .zip(resolved)
            .zip(rates)
            .map(|((id, market), hourly)| MarketState {
                market_id: id.clone(),
                price: market.market.mark_price,
                long_open_interest_usd: Decimal::ZERO,
                short_open_interest_usd: Decimal::ZERO,
                long_funding_rate: hourly,
                short_funding_rate: -hourly,
                long_borrow_rate: Decimal::ZERO,
                short_borrow_rate: Decimal::ZERO,
                available_liquidity_usd: None,
            })
            .collect())
    }

    async fn create_order(&self, wallet: Address, orders: &[CreateOrder]) -> AdapterResult<Vec<RouterOutput>> {
        let (client, signer) = self.trader(wallet)?;
        let (markets, account) = tokio::try_join!(self.load_markets(), self.load_account(client))?;
        let mut available = account.available_balance;
        let mut outputs = Vec::with_capacity(orders.len());

        for order in orders {
            let market = self.resolve(&markets, &order.market_id)?;
            let reference = order.trigger_price.unwrap_or(market.market.mark_price);
            validate_create_order(order, &market.info, reference, order.margin_delta)?;

            let amount = round_down_to_step(order.size_tokens_at(reference), market.market.amount_step);
            if amount <= Decimal::ZERO {
                return Err(AdapterError::Validation(format!(
                    "size is below the {} amount step {}",
                    market.market.instrument_name, market.market.amount_step
                )));
            }

            if !order.reduce_only {
                let notional = amount * reference;
                let required = notional * market.initial_margin_ratio() + notional * market.info.taker_fee;
                ensure_sufficient_balance(USDC, required, available)?;
                available -= required;
            }

            tracing::info!(
                wallet = %wallet,
                market = %order.market_id,
                side = %order.side,
                order_type = ?order.order_type,
                amount = %amount,
                "Submitting Aevo order"
            );
            outputs.push(
                self.submit(
                    client,
                    signer,
                    market,
                    Submission {
                        is_buy: order.side.is_long(),
                        order_type: order.order_type,
                        amount,
                        price: order.trigger_price,
                        slippage: order.slippage,
                        reduce_only: order.reduce_only,
                    },
                )
                .await?,
            );
        }
        Ok(outputs)
    }

    async fn update_order(&self, wallet: Address, orders: &[UpdateOrder]) -> AdapterResult<Vec<RouterOutput>> {
        let (client, signer) = self.trader(wallet)?;
        let (markets, open) = tokio::try_join!(self.load_markets(), self.load_orders(client))?;
        let mut outputs = Vec::with_capacity(orders.len());

        for update in orders {
            let market = self.resolve(&markets, &update.market_id)?;
            let current = open
                .iter()
                .find(|o| o.order_id == update.order_id)
                .ok_or_else(|| AdapterError::Validation(format!("Aevo order {} is not open", update.order_id)))?;
            if update.trigger_price <= Decimal::ZERO {
                return Err(AdapterError::Validation("trigger price must be positive".to_string()));
            }
            let size_tokens = if update.size_in_usd {
                update.size_delta / update.trigger_price
            } else {
                update.size_delta
            };
            let amount = round_down_to_step(size_tokens, market.market.amount_step);
            if amount <= Decimal::ZERO {
                return Err(AdapterError::Validation(format!(
                    "size is below the {} amount step {}",
                    market.market.instrument_name, market.market.amount_step
                )));
            }

            let submission = Submission {
                is_buy: is_buy(&current.side),
                order_type: if update.order_type == OrderType::Market {
                    OrderType::Limit
                } else {
                    update.order_type
                },
                amount,
                price: Some(update.trigger_price),
                slippage: update.slippage,
                reduce_only: current.reduce_only,
            };
            let body = self.sign_now(signer, market, submission)?;

            // Signed orders are immutable; replace instead.
            tracing::info!(order_id = %update.order_id, market = %update.market_id, "Replacing Aevo order");
            client
                .delete::<OrderAck>(&format!("/orders/{}", update.order_id))
                .await?;
            let replacement = self
                .post_order(client, market, submission, &body)
                .await
                .inspect_err(|e| {
                    tracing::error!(
                        order_id = %update.order_id,
                        error = %e,
                        "Aevo replacement rejected after the original was cancelled"
                    );
                })?;
            outputs.push(match replacement {
                RouterOutput::ApiAck { protocol, reference, message } => RouterOutput::ApiAck {
                    protocol,
                    reference,
                    message: format!("replaced {}: {message}", update.order_id),
                },
                other => other,
            });
        }
        Ok(outputs)
    }

    async fn cancel_order(&self, wallet: Address, orders: &[CancelOrder]) -> AdapterResult<Vec<RouterOutput>> {
        let client = self.account(wallet)?;
        let mut outputs = Vec::with_capacity(orders.len());

        for cancel in orders {
            tracing::info!(order_id = %cancel.order_id, market = %cancel.market_id, "Canceling Aevo order");
            let ack = client
                .delete::<OrderAck>(&format!("/orders/{}", cancel.order_id))
                .await?;
            outputs.push(RouterOutput::ApiAck {
                protocol: ProtocolId::Aevo,
                reference: ack.order_id,
                message: "cancelled".to_string(),
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
        let (client, signer) = self.trader(wallet)?;
        let markets = self.load_markets().await?;
        let mut outputs = Vec::with_capacity(closes.len());

        for (position, close) in positions.iter().zip(closes) {
            validate_close(close, position)?;
            let market = self.resolve(&markets, &position.market_id)?;
            let amount = if close.is_full_close(position) {
                position.size_tokens
            } else {
                round_down_to_step(close.close_size, market.market.amount_step)
            };

            tracing::info!(
                wallet = %wallet,
                market = %position.market_id,
                amount = %amount,
                order_type = ?close.order_type,
                "Closing Aevo position"
            );
            outputs.push(
                self.submit(
                    client,
                    signer,
                    market,
                    Submission {
                        is_buy: !position.side.is_long(),
                        order_type: close.order_type,
                        amount,
                        price: close.trigger_price,
                        slippage: close.slippage,
                        reduce_only: true,
                    },
                )
                .await?,
            );
        }
        Ok(outputs)
    }

    async fn get_all_positions(&self, wallet: Address) -> AdapterResult<Vec<PositionInfo>> {
        let client = self.account(wallet)?;
        let account = self.load_account(client).await?;
        let notional = total_notional(&account);
        Ok(account
            .positions
            .iter()
            .filter_map(|row| {
                map_position(self.market_id(&row.instrument_name), row, account.initial_margin, notional)
            })
            .collect())
    }

    async fn get_all_orders(&self, wallet: Address) -> AdapterResult<Vec<OrderInfo>> {
        let client = self.account(wallet)?;
        let orders = self.load_orders(client).await?;
        Ok(orders
            .iter()
            .map(|row| map_order(self.market_id(&row.instrument_name), row))
            .collect())
    }

    async fn get_account_info(&self, wallet: Address) -> AdapterResult<AccountInfo> {
        let client = self.account(wallet)?;
        let account = self.load_account(client).await?;
        let notional = total_notional(&account);
        Ok(AccountInfo {
            protocol: ProtocolId::Aevo,
            wallet,
            total_collateral_usd: account.equity,
            free_collateral_usd: account.available_balance,
            margin_ratio: (notional > Decimal::ZERO).then(|| account.equity / notional),
            balances: account
                .collaterals
                .into_iter()
                .map(|c| TokenBalance {
                    locked: c
                        .available_balance
                        .map_or(Decimal::ZERO, |available| (c.balance - available).max(Decimal::ZERO)),
                    token: c.collateral_asset,
                    amount: c.balance,
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
        let markets = self.load_markets().await?;
        orders
            .iter()
            .zip(existing)
            .map(|(order, current)| {
                let market = self.resolve(&markets, &order.market_id)?;
                let price = order.trigger_price.unwrap_or(market.market.mark_price);
                Ok(open_preview(order, current.as_ref(), market, price))
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
}
