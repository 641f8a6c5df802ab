//! GMX v2 Adapter
//!
//! Implements [`PerpsAdapter`] for GMX v2 synthetics. Markets and positions
//! are read from the Reader and DataStore contracts (batched through
//! Multicall3); prices come from the GMX REST API. Writes produce unsigned
//! `ExchangeRouter.multicall` transactions for the wallet to send.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy::sol_types::SolCall;
use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use futures::future::try_join_all;
use rust_decimal::Decimal;

use super::api_types::{Ticker, TokenEntry, TokensResponse};
use super::config::GmxV2Config;
use super::contracts::{
    CreateOrderParams, CreateOrderParamsAddresses, CreateOrderParamsNumbers, DECREASE_SWAP_NONE,
    GmxOrderType, IDataStore, IExchangeRouter, IReader, OrderProps, PositionProps,
};
use super::keys;
use super::math;
use crate::application::validation::{
    ensure_sufficient_balance, validate_close, validate_create_order, validate_margin_update,
    validate_slippage,
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
use crate::infrastructure::evm::erc20::{self, IERC20};
use crate::infrastructure::evm::units::{from_gmx_price, to_gmx_price};
use crate::infrastructure::evm::{MulticallBatch, RpcClient, from_units, to_units};
use crate::infrastructure::http::JsonHttpClient;

/// GMX USD amounts and factors carry 30 decimals.
const USD_DECIMALS: u8 = 30;

/// Chains with a GMX v2 deployment.
const SUPPORTED_CHAINS: [Chain; 3] = [Chain::ARBITRUM, Chain::new(43_114), Chain::ARBITRUM_SEPOLIA];

/// Number of DataStore reads per market in [`factor_keys`].
const FACTOR_CALLS: usize = 18;

/// A token referenced by a market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TokenRef {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
}

impl TokenRef {
    fn info(&self) -> TokenInfo {
        TokenInfo::erc20(self.symbol.clone(), self.address, self.decimals)
    }
}

/// A GMX market with its pool tokens resolved.
#[derive(Debug, Clone)]
pub(crate) struct GmxMarket {
    pub info: MarketInfo,
    pub market_token: Address,
    pub index: TokenRef,
    pub long: TokenRef,
    pub short: TokenRef,
}

impl GmxMarket {
    fn collateral_by_address(&self, token: Address) -> Option<&TokenRef> {
        [&self.long, &self.short]
            .into_iter()
            .find(|t| t.address == token)
    }

    fn is_single_token(&self) -> bool {
        self.long.address == self.short.address
    }
}

/// Native and token amounts spent by earlier transactions of one batch.
#[derive(Debug, Default)]
struct Committed {
    native: U256,
    tokens: HashMap<Address, U256>,
}

/// Per-market DataStore parameters, scaled to decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct MarketFactors {
    pub long_open_interest_usd: Decimal,
    pub short_open_interest_usd: Decimal,
    pub funding_factor: Decimal,
    pub funding_exponent: Decimal,
    pub long_borrowing_factor: Decimal,
    pub short_borrowing_factor: Decimal,
    pub long_borrowing_exponent: Decimal,
    pub short_borrowing_exponent: Decimal,
    pub long_cumulative_borrowing: Decimal,
    pub short_cumulative_borrowing: Decimal,
    pub long_pool_amount: Decimal,
    pub short_pool_amount: Decimal,
    pub long_max_open_interest_usd: Decimal,
    pub short_max_open_interest_usd: Decimal,
    pub min_collateral_factor: Decimal,
    pub position_fee_factor: Decimal,
    pub min_collateral_usd: Decimal,
}

impl MarketFactors {
    fn from_raw(market: &GmxMarket, raw: &[U256; FACTOR_CALLS], min_collateral_usd: Decimal) -> AdapterResult<Self> {
        let usd = |value: U256| from_units(value, USD_DECIMALS);
        // Single-token pools count both collateral slots against the same tokens.
        let divisor = if market.is_single_token() {
            Decimal::TWO
        } else {
            Decimal::ONE
        };
        Ok(Self {
            long_open_interest_usd: (usd(raw[0])? + usd(raw[1])?) / divisor,
            short_open_interest_usd: (usd(raw[2])? + usd(raw[3])?) / divisor,
            funding_factor: usd(raw[4])?,
            funding_exponent: usd(raw[5])?,
            long_borrowing_factor: usd(raw[6])?,
            short_borrowing_factor: usd(raw[7])?,
            long_borrowing_exponent: usd(raw[8])?,
            short_borrowing_exponent: usd(raw[9])?,
            long_cumulative_borrowing: usd(raw[10])?,
            short_cumulative_borrowing: usd(raw[11])?,
            long_pool_amount: from_units(raw[12], market.long.decimals)? / divisor,
            short_pool_amount: from_units(raw[13], market.short.decimals)? / divisor,
            long_max_open_interest_usd: usd(raw[14])?,
            short_max_open_interest_usd: usd(raw[15])?,
            min_collateral_factor: usd(raw[16])?,
            position_fee_factor: usd(raw[17])?,
            min_collateral_usd,
        })
    }

    const fn cumulative_borrowing(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.long_cumulative_borrowing,
            Side::Short => self.short_cumulative_borrowing,
        }
    }
}

fn factor_keys(market: &GmxMarket) -> [B256; FACTOR_CALLS] {
    let token = market.market_token;
    [
        keys::open_interest_key(token, market.long.address, true),
        keys::open_interest_key(token, market.short.address, true),
        keys::open_interest_key(token, market.long.address, false),
        keys::open_interest_key(token, market.short.address, false),
        keys::funding_factor_key(token),
        keys::funding_exponent_factor_key(token),
        keys::borrowing_factor_key(token, true),
        keys::borrowing_factor_key(token, false),
        keys::borrowing_exponent_factor_key(token, true),
        keys::borrowing_exponent_factor_key(token, false),
        keys::cumulative_borrowing_factor_key(token, true),
        keys::cumulative_borrowing_factor_key(token, false),
        keys::pool_amount_key(token, market.long.address),
        keys::pool_amount_key(token, market.short.address),
        keys::max_open_interest_key(token, true),
        keys::max_open_interest_key(token, false),
        keys::min_collateral_factor_key(token),
        keys::position_fee_factor_key(token, false),
    ]
}

/// Everything needed to encode one `createOrder`.
#[derive(Debug, Clone)]
pub(crate) struct OrderRequest<'a> {
    pub collateral: &'a TokenRef,
    pub side: Side,
    pub order_type: GmxOrderType,
    pub size_delta_usd: Decimal,
    /// Collateral sent to the OrderVault with the order.
    pub collateral_in: U256,
    /// Collateral withdrawn by a decrease order.
    pub collateral_out: U256,
    pub trigger_price: Option<Decimal>,
    pub acceptable_price: Decimal,
    pub execution_fee: U256,
}

/// GMX v2 adapter.
#[derive(Debug)]
pub struct GmxV2Adapter {
    config: GmxV2Config,
    chain: Chain,
    multicall: Address,
    rpc: RpcClient,
    api: JsonHttpClient,
    markets: TimedCache<(), Arc<Vec<GmxMarket>>>,
    tickers: TimedCache<(), Arc<HashMap<Address, Ticker>>>,
    factors: TimedCache<Address, MarketFactors>,
}

impl GmxV2Adapter {
    /// Build the adapter for `network`.
    pub fn new(
        config: GmxV2Config,
        network: &NetworkConfig,
        http: &HttpSettings,
        cache: &CacheConfig,
    ) -> AdapterResult<Self> {
        let chain = network.chain();
        if !SUPPORTED_CHAINS.contains(&chain) {
            return Err(AdapterError::UnsupportedNetwork {
                protocol: ProtocolId::GmxV2,
                chain_id: chain.id(),
            });
        }

        let rpc = RpcClient::new(&network.rpc_client_config(http))?;
        let api = JsonHttpClient::public(&http.client_config(&config.api_url))?;

        tracing::info!(
            chain = %chain,
            exchange_router = %config.contracts.exchange_router,
            "GMX v2 adapter initialized"
        );

        Ok(Self {
            config,
            chain,
            multicall: network.multicall,
            rpc,
            api,
            markets: TimedCache::new("gmx_v2_markets", cache.markets.policy()),
            tickers: TimedCache::new("gmx_v2_tickers", cache.prices.policy()),
            factors: TimedCache::new("gmx_v2_factors", cache.state.policy()),
        })
    }

    // ========================================================================
    // Cached reads
    // ========================================================================

    async fn load_markets(&self) -> AdapterResult<Arc<Vec<GmxMarket>>> {
        self.markets
            .get_or_fetch((), || async move {
                let tokens: TokensResponse = self.api.get_public("/tokens").await?;
                let tokens: HashMap<Address, TokenEntry> = tokens
                    .tokens
                    .into_iter()
                    .map(|t| (t.address, t))
                    .collect();

                let call = IReader::getMarketsCall {
                    dataStore: self.config.contracts.data_store,
                    start: U256::ZERO,
                    end: U256::from(self.config.max_entries),
                };
                let raw = self.rpc.call(self.config.contracts.reader, &call).await?.markets;

                let markets: Vec<GmxMarket> = raw
                    .iter()
                    .filter_map(|props| self.resolve_market(props, &tokens))
                    .collect();
                tracing::debug!(count = markets.len(), "Loaded GMX v2 markets");
                Ok::<_, AdapterError>(Arc::new(markets))
            })
            .await
    }

    async fn load_tickers(&self) -> AdapterResult<Arc<HashMap<Address, Ticker>>> {
        self.tickers
            .get_or_fetch((), || async move {
                let tickers: Vec<Ticker> = self.api.get_public("/prices/tickers").await?;
                Ok::<_, AdapterError>(Arc::new(
                    tickers.into_iter().map(|t| (t.token_address, t)).collect(),
                ))
            })
            .await
    }

    async fn load_factors(&self, market: &GmxMarket) -> AdapterResult<MarketFactors> {
        self.factors
            .get_or_fetch(market.market_token, || async move {
                let data_store = self.config.contracts.data_store;
                let mut batch = MulticallBatch::new();
                for key in factor_keys(market) {
                    batch.push(data_store, &IDataStore::getUintCall { key });
                }
                let global = batch.push(
                    data_store,
                    &IDataStore::getUintCall {
                        key: keys::min_collateral_usd_key(),
                    },
                );
                let results = batch.execute(&self.rpc, self.multicall).await?;

                let uint = |index: usize| results.decode::<IDataStore::getUintCall>(index).map(|r| r._0);
                let raw: [U256; FACTOR_CALLS] = (0..FACTOR_CALLS)
                    .map(uint)
                    .collect::<AdapterResult<Vec<_>>>()?
                    .try_into()
                    .map_err(|_| AdapterError::Rpc("incomplete GMX DataStore factor batch".to_string()))?;
                let min_collateral_usd = from_units(uint(global)?, USD_DECIMALS)?;
                MarketFactors::from_raw(market, &raw, min_collateral_usd)
            })
            .await
    }

    async fn load_factors_for(
        &self,
        markets: &[&GmxMarket],
    ) -> AdapterResult<HashMap<Address, MarketFactors>> {
        let mut unique: Vec<&GmxMarket> = Vec::new();
        for market in markets {
            if !unique.iter().any(|m| m.market_token == market.market_token) {
                unique.push(market);
            }
        }
        let factors = try_join_all(unique.iter().map(|m| self.load_factors(m))).await?;
        Ok(unique
            .iter()
            .map(|m| m.market_token)
            .zip(factors)
            .collect())
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    fn resolve_market(
        &self,
        props: &super::contracts::MarketProps,
        tokens: &HashMap<Address, TokenEntry>,
    ) -> Option<GmxMarket> {
        // Swap-only markets have no index token.
        if props.indexToken == Address::ZERO {
            return None;
        }
        let token_ref = |address: Address| {
            tokens.get(&address).map(|t| TokenRef {
                symbol: t.symbol.clone(),
                address,
                decimals: t.decimals,
            })
        };
        let (Some(index), Some(long), Some(short)) = (
            token_ref(props.indexToken),
            token_ref(props.longToken),
            token_ref(props.shortToken),
        ) else {
            tracing::debug!(market = %props.marketToken, "Skipping market with unknown tokens");
            return None;
        };

        let mut collateral = vec![long.info()];
        if short.address != long.address {
            collateral.push(short.info());
        }

        let info = MarketInfo {
            market_id: MarketId::new(
                self.chain,
                ProtocolId::GmxV2,
                props.marketToken.to_checksum(None),
            ),
            protocol: ProtocolId::GmxV2,
            chain: self.chain,
            index_token: index.info(),
            long_collateral: collateral.clone(),
            short_collateral: collateral,
            min_leverage: self.config.min_leverage,
            max_leverage: self.config.max_leverage,
            min_initial_margin_usd: self.config.min_collateral_usd,
            min_position_size_usd: self.config.min_position_size_usd,
            maker_fee: self.config.maker_fee,
            taker_fee: self.config.taker_fee,
            price_precision: Decimal::new(1, 8),
            size_precision: Decimal::new(1, u32::from(index.decimals.min(18))),
            supports_limit_orders: true,
            supports_partial_close: true,
        };

        Some(GmxMarket {
            info,
            market_token: props.marketToken,
            index,
            long,
            short,
        })
    }

    fn find_market<'a>(&self, markets: &'a [GmxMarket], id: &MarketId) -> AdapterResult<&'a GmxMarket> {
        let not_found = || AdapterError::MarketNotFound(id.to_string());
        if id.protocol() != ProtocolId::GmxV2 || id.chain() != self.chain {
            return Err(not_found());
        }
        let token: Address = id.native_id().parse().map_err(|_| not_found())?;
        markets
            .iter()
            .find(|m| m.market_token == token)
            .ok_or_else(not_found)
    }

    fn find_market_by_token<'a>(markets: &'a [GmxMarket], token: Address) -> Option<&'a GmxMarket> {
        markets.iter().find(|m| m.market_token == token)
    }

    /// Collateral token by symbol. `ETH` and `WETH` both name the wrapped
    /// native token.
    fn resolve_collateral<'a>(&self, market: &'a GmxMarket, symbol: &str) -> AdapterResult<&'a TokenRef> {
        let wants_native = symbol.eq_ignore_ascii_case("ETH") || symbol.eq_ignore_ascii_case("WETH");
        [&market.long, &market.short]
            .into_iter()
            .find(|t| {
                t.symbol.eq_ignore_ascii_case(symbol)
                    || (wants_native && t.address == self.config.wrapped_native_token)
            })
            .ok_or_else(|| {
                AdapterError::Validation(format!(
                    "{symbol} is not a collateral token of {}",
                    market.info.market_id
                ))
            })
    }

    fn is_native(&self, token: &TokenRef) -> bool {
        token.address == self.config.wrapped_native_token
    }

    fn execution_fee(&self, gas_price: U256, is_increase: bool) -> AdapterResult<U256> {
        let fee = &self.config.execution_fee;
        let gas_limit = if is_increase {
            fee.increase_gas_limit
        } else {
            fee.decrease_gas_limit
        };
        math::execution_fee(gas_limit, gas_price, fee.multiplier)
    }

    // ========================================================================
    // Write helpers
    // ========================================================================

    /// Check balances for `collateral_in` plus the execution fee on top of
    /// what earlier transactions of the batch already spend, and prepend an
    /// approval when the Router allowance is too low.
    async fn funding_outputs(
        &self,
        wallet: Address,
        collateral: &TokenRef,
        collateral_in: U256,
        execution_fee: U256,
        committed: &mut Committed,
    ) -> AdapterResult<Vec<RouterOutput>> {
        let native_needed = committed.native
            + if self.is_native(collateral) {
                execution_fee + collateral_in
            } else {
                execution_fee
            };
        let native = self.rpc.native_balance(wallet).await?;
        ensure_sufficient_balance(
            "ETH",
            from_units(native_needed, 18)?,
            from_units(native, 18)?,
        )?;
        committed.native = native_needed;

        if self.is_native(collateral) || collateral_in.is_zero() {
            return Ok(Vec::new());
        }

        let spent = committed.tokens.entry(collateral.address).or_default();
        let token_needed = *spent + collateral_in;
        let balance = erc20::balance_of(&self.rpc, collateral.address, wallet).await?;
        ensure_sufficient_balance(
            &collateral.symbol,
            from_units(token_needed, collateral.decimals)?,
            from_units(balance, collateral.decimals)?,
        )?;
        *spent = token_needed;

        let approval = erc20::approval_if_needed(
            &self.rpc,
            self.chain,
            collateral.address,
            &collateral.symbol,
            wallet,
            self.config.contracts.router,
            token_needed,
        )
        .await?;
        Ok(approval.into_iter().map(RouterOutput::Transaction).collect())
    }

    fn order_tx(&self, wallet: Address, market: &GmxMarket, request: &OrderRequest<'_>) -> AdapterResult<UnsignedTx> {
        build_order_tx(&self.config, self.chain, wallet, market, request)
    }

    async fn prices(&self) -> AdapterResult<(Arc<Vec<GmxMarket>>, Arc<HashMap<Address, Ticker>>)> {
        tokio::try_join!(self.load_markets(), self.load_tickers())
    }
}

/// Mid price of `token` in USD per whole token.
fn token_price(tickers: &HashMap<Address, Ticker>, token: &TokenRef) -> AdapterResult<Decimal> {
    let ticker = tickers
        .get(&token.address)
        .ok_or_else(|| AdapterError::MarketNotFound(format!("no GMX price for {}", token.symbol)))?;
    from_gmx_price(ticker.mid_price(), token.decimals)
}

fn parse_order_key(order_id: &str) -> AdapterResult<B256> {
    order_id
        .parse()
        .map_err(|_| AdapterError::Validation(format!("invalid GMX order key: {order_id}")))
}

/// GMX order type for an open request.
const fn open_order_type(order_type: OrderType, reduce_only: bool) -> GmxOrderType {
    match (order_type, reduce_only) {
        (OrderType::Market, false) => GmxOrderType::MarketIncrease,
        (OrderType::Limit, false) => GmxOrderType::LimitIncrease,
        (OrderType::Market, true) => GmxOrderType::MarketDecrease,
        (OrderType::Limit | OrderType::TakeProfit, _) => GmxOrderType::LimitDecrease,
        (OrderType::StopLoss, _) => GmxOrderType::StopLossDecrease,
    }
}

/// GMX order type for a close request.
const fn close_order_type(order_type: OrderType) -> GmxOrderType {
    match order_type {
        OrderType::Market => GmxOrderType::MarketDecrease,
        OrderType::Limit | OrderType::TakeProfit => GmxOrderType::LimitDecrease,
        OrderType::StopLoss => GmxOrderType::StopLossDecrease,
    }
}

/// Common order type of an on-chain order; `None` for swaps and liquidations.
const fn common_order_type(order_type: GmxOrderType) -> Option<OrderType> {
    match order_type {
        GmxOrderType::MarketIncrease | GmxOrderType::MarketDecrease => Some(OrderType::Market),
        GmxOrderType::LimitIncrease => Some(OrderType::Limit),
        GmxOrderType::LimitDecrease => Some(OrderType::TakeProfit),
        GmxOrderType::StopLossDecrease => Some(OrderType::StopLoss),
        GmxOrderType::MarketSwap | GmxOrderType::LimitSwap | GmxOrderType::Liquidation => None,
    }
}

/// Encode `ExchangeRouter.multicall([sendWnt, sendTokens?, createOrder])`.
pub(crate) fn build_order_tx(
    config: &GmxV2Config,
    chain: Chain,
    wallet: Address,
    market: &GmxMarket,
    request: &OrderRequest<'_>,
) -> AdapterResult<UnsignedTx> {
    let vault = config.contracts.order_vault;
    let native_collateral = request.collateral.address == config.wrapped_native_token;
    let native_in = if native_collateral {
        request.collateral_in
    } else {
        U256::ZERO
    };
    let value = request.execution_fee + native_in;

    let mut calls: Vec<Bytes> = vec![
        IExchangeRouter::sendWntCall {
            receiver: vault,
            amount: value,
        }
        .abi_encode()
        .into(),
    ];
    if !native_collateral && !request.collateral_in.is_zero() {
        calls.push(
            IExchangeRouter::sendTokensCall {
                token: request.collateral.address,
                receiver: vault,
                amount: request.collateral_in,
            }
            .abi_encode()
            .into(),
        );
    }

    let index_decimals = market.index.decimals;
    let trigger_price = match request.trigger_price {
        Some(price) => to_gmx_price(price, index_decimals)?,
        None => U256::ZERO,
    };
    let params = CreateOrderParams {
        addresses: CreateOrderParamsAddresses {
            receiver: wallet,
            callbackContract: Address::ZERO,
            uiFeeReceiver: config.ui_fee_receiver,
            market: market.market_token,
            initialCollateralToken: request.collateral.address,
            swapPath: Vec::new(),
        },
        numbers: CreateOrderParamsNumbers {
            sizeDeltaUsd: to_units(request.size_delta_usd, USD_DECIMALS)?,
            initialCollateralDeltaAmount: request.collateral_out,
            triggerPrice: trigger_price,
            acceptablePrice: to_gmx_price(request.acceptable_price, index_decimals)?,
            executionFee: request.execution_fee,
            callbackGasLimit: U256::ZERO,
            minOutputAmount: U256::ZERO,
        },
        orderType: request.order_type as u8,
        decreasePositionSwapType: DECREASE_SWAP_NONE,
        isLong: request.side.is_long(),
        shouldUnwrapNativeToken: native_collateral,
        referralCode: config.referral_code,
    };
    calls.push(IExchangeRouter::createOrderCall { params }.abi_encode().into());

    let verb = if request.order_type.is_increase() {
        "Increase"
    } else {
        "Decrease"
    };
    Ok(UnsignedTx {
        chain,
        to: config.contracts.exchange_router,
        data: IExchangeRouter::multicallCall { data: calls }.abi_encode().into(),
        value,
        heading: format!("{verb} {} {}", market.index.symbol, request.side),
        description: format!(
            "{:?} order on {} for {} USD with {} collateral",
            request.order_type, market.info.market_id, request.size_delta_usd, request.collateral.symbol
        ),
    })
}

#[async_trait]
impl PerpsAdapter for GmxV2Adapter {
    fn protocol_id(&self) -> ProtocolId {
        ProtocolId::GmxV2
    }

    fn supported_chains(&self) -> Vec<Chain> {
        vec![self.chain]
    }

    async fn setup(&self, wallet: Address) -> AdapterResult<Vec<RouterOutput>> {
        let markets = self.load_markets().await?;
        let mut seen = HashSet::new();
        let tokens: Vec<&TokenRef> = markets
            .iter()
            .flat_map(|m| [&m.long, &m.short])
            .filter(|t| !self.is_native(t) && seen.insert(t.address))
            .collect();

        let router = self.config.contracts.router;
        let mut batch = MulticallBatch::new();
        for token in &tokens {
            batch.push(
                token.address,
                &IERC20::allowanceCall {
                    owner: wallet,
                    spender: router,
                },
            );
        }
        let results = batch.execute(&self.rpc, self.multicall).await?;

        let outputs: Vec<RouterOutput> = tokens
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                results
                    .try_decode::<IERC20::allowanceCall>(*i)
                    .is_some_and(|r| r._0.is_zero())
            })
            .map(|(_, token)| {
                RouterOutput::Transaction(erc20::approve_tx(
                    self.chain,
                    token.address,
                    &token.symbol,
                    router,
                    U256::MAX,
                ))
            })
            .collect();
        tracing::info!(wallet = %wallet, approvals = outputs.len(), "Prepared GMX v2 setup");
        Ok(outputs)
    }

    async fn get_all_markets(&self) -> AdapterResult<Vec<MarketInfo>> {
        let markets = self.load_markets().await?;
        Ok(markets.iter().map(|m| m.info.clone()).collect())
    }

    async fn get_market_prices(&self, market_ids: &[MarketId]) -> AdapterResult<Vec<Decimal>> {
        let (markets, tickers) = self.prices().await?;
        market_ids
            .iter()
            .map(|id| {
                let market = self.find_market(&markets, id)?;
                token_price(&tickers, &market.index)
            })
            .collect()
    }

    async fn get_markets_state(&self, market_ids: &[MarketId]) -> AdapterResult<Vec<MarketState>> {
        let (markets, tickers) = self.prices().await?;
        let selected = market_ids
            .iter()
            .map(|id| self.find_market(&markets, id))
            .collect::<AdapterResult<Vec<_>>>()?;
        let factors = self.load_factors_for(&selected).await?;

        selected
            .into_iter()
            .map(|market| {
                let f = factors
                    .get(&market.market_token)
                    .copied()
                    .unwrap_or_default();
                let price = token_price(&tickers, &market.index)?;
                let long_pool_usd = f.long_pool_amount * token_price(&tickers, &market.long)?;
                let short_pool_usd = f.short_pool_amount * token_price(&tickers, &market.short)?;

                let (long_funding_rate, short_funding_rate) = math::funding_rates_per_hour(
                    f.long_open_interest_usd,
                    f.short_open_interest_usd,
                    f.funding_factor,
                    f.funding_exponent,
                );
                let long_borrow_rate = math::borrowing_rate_per_hour(
                    f.long_borrowing_factor,
                    f.long_borrowing_exponent,
                    f.long_open_interest_usd,
                    long_pool_usd,
                );
                let short_borrow_rate = math::borrowing_rate_per_hour(
                    f.short_borrowing_factor,
                    f.short_borrowing_exponent,
                    f.short_open_interest_usd,
                    short_pool_usd,
                );
                let capped = !f.long_max_open_interest_usd.is_zero() || !f.short_max_open_interest_usd.is_zero();
                let available_liquidity_usd = capped.then(|| {
                    (f.long_max_open_interest_usd - f.long_open_interest_usd).max(Decimal::ZERO)
                        + (f.short_max_open_interest_usd - f.short_open_interest_usd).max(Decimal::ZERO)
                });

                Ok(MarketState {
                    market_id: market.info.market_id.clone(),
                    price,
                    long_open_interest_usd: f.long_open_interest_usd,
                    short_open_interest_usd: f.short_open_interest_usd,
                    long_funding_rate,
                    short_funding_rate,
                    long_borrow_rate,
                    short_borrow_rate,
                    available_liquidity_usd,
                })
            })
            .collect()
    }

    async fn create_order(&self, wallet: Address, orders: &[CreateOrder]) -> AdapterResult<Vec<RouterOutput>> {
        let (markets, tickers) = self.prices().await?;
        let gas_price = self.rpc.gas_price().await?;
        let mut committed = Committed::default();
        let mut outputs = Vec::new();

        for order in orders {
            let market = self.find_market(&markets, &order.market_id)?;
            let collateral = self.resolve_collateral(market, &order.collateral_token)?;
            let mark = token_price(&tickers, &market.index)?;
            let reference = order.trigger_price.unwrap_or(mark);
            let margin_usd = order.margin_delta * token_price(&tickers, collateral)?;

            validate_create_order(order, &market.info, reference, margin_usd)?;

            let order_type = open_order_type(order.order_type, order.reduce_only);
            let is_increase = order_type.is_increase();
            let execution_fee = self.execution_fee(gas_price, is_increase)?;
            let margin = to_units(order.margin_delta, collateral.decimals)?;
            let (collateral_in, collateral_out) = if is_increase {
                (margin, U256::ZERO)
            } else {
                (U256::ZERO, margin)
            };

            let request = OrderRequest {
                collateral,
                side: order.side,
                order_type,
                size_delta_usd: order.size_usd_at(reference),
                collateral_in,
                collateral_out,
                trigger_price: order.trigger_price,
                acceptable_price: math::acceptable_price(reference, order.side, is_increase, order.slippage),
                execution_fee,
            };

            tracing::info!(
                wallet = %wallet,
                market = %order.market_id,
                side = %order.side,
                order_type = ?order_type,
                size_usd = %request.size_delta_usd,
                "Building GMX v2 order"
            );

            outputs.extend(
                self.funding_outputs(wallet, collateral, collateral_in, execution_fee, &mut committed)
                    .await?,
            );
            outputs.push(RouterOutput::Transaction(self.order_tx(wallet, market, &request)?));
        }
        Ok(outputs)
    }

    async fn update_order(&self, wallet: Address, orders: &[UpdateOrder]) -> AdapterResult<Vec<RouterOutput>> {
        let markets = self.load_markets().await?;
        let mut outputs = Vec::with_capacity(orders.len());

        for update in orders {
            let market = self.find_market(&markets, &update.market_id)?;
            let key = parse_order_key(&update.order_id)?;
            validate_slippage(update.slippage)?;
            if update.trigger_price <= Decimal::ZERO {
                return Err(AdapterError::Validation(
                    "trigger price must be positive".to_string(),
                ));
            }

            let current = self
                .rpc
                .call(
                    self.config.contracts.reader,
                    &IReader::getOrderCall {
                        dataStore: self.config.contracts.data_store,
                        key,
                    },
                )
                .await?
                .order;
            if current.addresses.account != wallet {
                return Err(AdapterError::Validation(format!(
                    "order {} does not belong to {wallet}",
                    update.order_id
                )));
            }
            let is_increase = GmxOrderType::from_u8(current.numbers.orderType)
                .is_some_and(GmxOrderType::is_increase);

            let size_usd = if update.size_in_usd {
                update.size_delta
            } else {
                update.size_delta * update.trigger_price
            };
            let acceptable = math::acceptable_price(update.trigger_price, update.side, is_increase, update.slippage);
            let call = IExchangeRouter::updateOrderCall {
                key,
                sizeDeltaUsd: to_units(size_usd, USD_DECIMALS)?,
                acceptablePrice: to_gmx_price(acceptable, market.index.decimals)?,
                triggerPrice: to_gmx_price(update.trigger_price, market.index.decimals)?,
                minOutputAmount: U256::ZERO,
            };

            tracing::info!(order_id = %update.order_id, market = %update.market_id, "Updating GMX v2 order");
            outputs.push(RouterOutput::Transaction(UnsignedTx {
                chain: self.chain,
                to: self.config.contracts.exchange_router,
                data: call.abi_encode().into(),
                value: U256::ZERO,
                heading: format!("Update {} order", market.index.symbol),
                description: format!("Update order {} to trigger at {}", update.order_id, update.trigger_price),
            }));
        }
        Ok(outputs)
    }

    async fn cancel_order(&self, _wallet: Address, orders: &[CancelOrder]) -> AdapterResult<Vec<RouterOutput>> {
        orders
            .iter()
            .map(|cancel| {
                let key = parse_order_key(&cancel.order_id)?;
                tracing::info!(order_id = %cancel.order_id, market = %cancel.market_id, "Canceling GMX v2 order");
                Ok(RouterOutput::Transaction(UnsignedTx {
                    chain: self.chain,
                    to: self.config.contracts.exchange_router,
                    data: IExchangeRouter::cancelOrderCall { key }.abi_encode().into(),
                    value: U256::ZERO,
                    heading: "Cancel order".to_string(),
                    description: format!("Cancel order {} on {}", cancel.order_id, cancel.market_id),
                }))
            })
            .collect()
    }

    async fn close_position(
        &self,
        wallet: Address,
        positions: &[PositionInfo],
        closes: &[ClosePosition],
    ) -> AdapterResult<Vec<RouterOutput>> {
        ensure_paired(positions, closes, "closes")?;
        let (markets, tickers) = self.prices().await?;
        let gas_price = self.rpc.gas_price().await?;
        let execution_fee = self.execution_fee(gas_price, false)?;
        let mut committed = Committed::default();
        let mut outputs = Vec::with_capacity(closes.len());

        for (position, close) in positions.iter().zip(closes) {
            validate_close(close, position)?;
            let market = self.find_market(&markets, &position.market_id)?;
            let collateral = self.resolve_collateral(market, &position.collateral_token)?;
            if let Some(output) = &close.output_token
                && !output.eq_ignore_ascii_case(&collateral.symbol)
            {
                return Err(AdapterError::Validation(format!(
                    "GMX v2 closes pay out in {}, not {output}",
                    collateral.symbol
                )));
            }

            let mark = token_price(&tickers, &market.index)?;
            let reference = close.trigger_price.unwrap_or(mark);
            let size_delta_usd = if close.is_full_close(position) {
                position.size_usd
            } else {
                position.size_usd * close.close_size / position.size_tokens
            };
            let request = OrderRequest {
                collateral,
                side: position.side,
                order_type: close_order_type(close.order_type),
                size_delta_usd,
                collateral_in: U256::ZERO,
                collateral_out: U256::ZERO,
                trigger_price: close.trigger_price,
                acceptable_price: math::acceptable_price(reference, position.side, false, close.slippage),
                execution_fee,
            };

            tracing::info!(
                wallet = %wallet,
                market = %position.market_id,
                close_size = %close.close_size,
                "Building GMX v2 close"
            );
            outputs.extend(
                self.funding_outputs(wallet, collateral, U256::ZERO, execution_fee, &mut committed)
                    .await?,
            );
            outputs.push(RouterOutput::Transaction(self.order_tx(wallet, market, &request)?));
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
        let (markets, tickers) = self.prices().await?;
        let gas_price = self.rpc.gas_price().await?;
        let mut committed = Committed::default();
        let mut outputs = Vec::with_capacity(updates.len());

        for (position, update) in positions.iter().zip(updates) {
            validate_margin_update(update, position)?;
            let market = self.find_market(&markets, &position.market_id)?;
            let collateral = self.resolve_collateral(market, &update.collateral_token)?;
            let mark = token_price(&tickers, &market.index)?;
            let amount = to_units(update.margin_delta, collateral.decimals)?;
            let execution_fee = self.execution_fee(gas_price, update.is_deposit)?;

            let (order_type, collateral_in, collateral_out) = if update.is_deposit {
                (GmxOrderType::MarketIncrease, amount, U256::ZERO)
            } else {
                (GmxOrderType::MarketDecrease, U256::ZERO, amount)
            };
            let request = OrderRequest {
                collateral,
                side: position.side,
                order_type,
                size_delta_usd: Decimal::ZERO,
                collateral_in,
                collateral_out,
                trigger_price: None,
                acceptable_price: math::acceptable_price(
                    mark,
                    position.side,
                    update.is_deposit,
                    self.config.default_slippage,
                ),
                execution_fee,
            };

            tracing::info!(
                wallet = %wallet,
                market = %position.market_id,
                delta = %update.signed_delta(),
                "Building GMX v2 margin update"
            );
            outputs.extend(
                self.funding_outputs(wallet, collateral, collateral_in, execution_fee, &mut committed)
                    .await?,
            );
            outputs.push(RouterOutput::Transaction(self.order_tx(wallet, market, &request)?));
        }
        Ok(outputs)
    }

    async fn get_all_positions(&self, wallet: Address) -> AdapterResult<Vec<PositionInfo>> {
        let (markets, tickers) = self.prices().await?;
        let call = IReader::getAccountPositionsCall {
            dataStore: self.config.contracts.data_store,
            account: wallet,
            start: U256::ZERO,
            end: U256::from(self.config.max_entries),
        };
        let raw = self.rpc.call(self.config.contracts.reader, &call).await?.positions;

        let held: Vec<(&PositionProps, &GmxMarket)> = raw
            .iter()
            .filter_map(|p| Self::find_market_by_token(&markets, p.addresses.market).map(|m| (p, m)))
            .collect();
        let held_markets: Vec<&GmxMarket> = held.iter().map(|(_, m)| *m).collect();
        let factors = self.load_factors_for(&held_markets).await?;

        let mut positions = Vec::with_capacity(held.len());
        for (props, market) in held {
            let Some(collateral) = market.collateral_by_address(props.addresses.collateralToken) else {
                continue;
            };
            let f = factors.get(&market.market_token).copied().unwrap_or_default();
            positions.push(map_position(wallet, props, market, collateral, &f, &tickers)?);
        }
        Ok(positions)
    }

    async fn get_all_orders(&self, wallet: Address) -> AdapterResult<Vec<OrderInfo>> {
        let (markets, tickers) = self.prices().await?;
        let data_store = self.config.contracts.data_store;
        let keys = self
            .rpc
            .call(
                data_store,
                &IDataStore::getBytes32ValuesAtCall {
                    setKey: keys::account_order_list_key(wallet),
                    start: U256::ZERO,
                    end: U256::from(self.config.max_entries),
                },
            )
            .await?
            .values;

        let mut batch = MulticallBatch::new();
        for key in &keys {
            batch.push(
                self.config.contracts.reader,
                &IReader::getOrderCall {
                    dataStore: data_store,
                    key: *key,
                },
            );
        }
        let results = batch.execute(&self.rpc, self.multicall).await?;

        let mut orders = Vec::new();
        for (index, key) in keys.iter().enumerate() {
            let Some(order) = results.try_decode::<IReader::getOrderCall>(index).map(|r| r.order) else {
                continue;
            };
            let Some(market) = Self::find_market_by_token(&markets, order.addresses.market) else {
                continue;
            };
            if let Some(info) = map_order(*key, &order, market, &tickers)? {
                orders.push(info);
            }
        }
        Ok(orders)
    }

    async fn get_account_info(&self, wallet: Address) -> AdapterResult<AccountInfo> {
        let positions = self.get_all_positions(wallet).await?;
        let (markets, tickers) = self.prices().await?;

        let mut seen = HashSet::new();
        let tokens: Vec<&TokenRef> = markets
            .iter()
            .flat_map(|m| [&m.long, &m.short])
            .filter(|t| seen.insert(t.address))
            .collect();
        let mut batch = MulticallBatch::new();
        for token in &tokens {
            batch.push(token.address, &IERC20::balanceOfCall { account: wallet });
        }
        let results = batch.execute(&self.rpc, self.multicall).await?;

        let mut balances = Vec::new();
        let mut wallet_usd = Decimal::ZERO;
        for (index, token) in tokens.iter().enumerate() {
            let raw = results.decode::<IERC20::balanceOfCall>(index)?._0;
            if raw.is_zero() {
                continue;
            }
            let amount = from_units(raw, token.decimals)?;
            wallet_usd += amount * token_price(&tickers, token)?;
            balances.push(TokenBalance {
                token: token.symbol.clone(),
                amount,
                locked: Decimal::ZERO,
            });
        }

        let margin_usd: Decimal = positions.iter().map(|p| p.margin_usd).sum();
        Ok(AccountInfo {
            protocol: ProtocolId::GmxV2,
            wallet,
            total_collateral_usd: margin_usd + wallet_usd,
            free_collateral_usd: wallet_usd,
            margin_ratio: None,
            balances,
        })
    }

    async fn get_open_trade_preview(
        &self,
        _wallet: Address,
        orders: &[CreateOrder],
        existing: &[Option<PositionInfo>],
    ) -> AdapterResult<Vec<OpenTradePreview>> {
        ensure_paired(orders, existing, "existing positions")?;
        let (markets, tickers) = self.prices().await?;
        let selected = orders
            .iter()
            .map(|o| self.find_market(&markets, &o.market_id))
            .collect::<AdapterResult<Vec<_>>>()?;
        let factors = self.load_factors_for(&selected).await?;

        let mut previews = Vec::with_capacity(orders.len());
        for ((order, current), market) in orders.iter().zip(existing).zip(selected) {
            let collateral = self.resolve_collateral(market, &order.collateral_token)?;
            let f = factors.get(&market.market_token).copied().unwrap_or_default();
            let mark = token_price(&tickers, &market.index)?;
            let price = order.trigger_price.unwrap_or(mark);
            let margin_in_usd = order.margin_delta * token_price(&tickers, collateral)?;
            previews.push(open_preview(order, current.as_ref(), &market.info, &f, price, margin_in_usd));
        }
        Ok(previews)
    }

    async fn get_close_trade_preview(
        &self,
        _wallet: Address,
        positions: &[PositionInfo],
        closes: &[ClosePosition],
    ) -> AdapterResult<Vec<CloseTradePreview>> {
        ensure_paired(positions, closes, "closes")?;
        let markets = self.load_markets().await?;
        let selected = positions
            .iter()
            .map(|p| self.find_market(&markets, &p.market_id))
            .collect::<AdapterResult<Vec<_>>>()?;
        let factors = self.load_factors_for(&selected).await?;

        Ok(positions
            .iter()
            .zip(closes)
            .zip(selected)
            .map(|((position, close), market)| {
                let f = factors.get(&market.market_token).copied().unwrap_or_default();
                close_preview(position, close, &market.info, &f)
            })
            .collect())
    }

    async fn get_update_margin_preview(
        &self,
        _wallet: Address,
        positions: &[PositionInfo],
        updates: &[UpdatePositionMargin],
    ) -> AdapterResult<Vec<MarginPreview>> {
        ensure_paired(positions, updates, "margin updates")?;
        let (markets, tickers) = self.prices().await?;
        let selected = positions
            .iter()
            .map(|p| self.find_market(&markets, &p.market_id))
            .collect::<AdapterResult<Vec<_>>>()?;
        let factors = self.load_factors_for(&selected).await?;

        let mut previews = Vec::with_capacity(updates.len());
        for ((position, update), market) in positions.iter().zip(updates).zip(selected) {
            let collateral = self.resolve_collateral(market, &update.collateral_token)?;
            let f = factors.get(&market.market_token).copied().unwrap_or_default();
            let delta_usd = update.signed_delta() * token_price(&tickers, collateral)?;
            previews.push(margin_preview(position, update, delta_usd, &market.info, &f));
        }
        Ok(previews)
    }
}

// ============================================================================
// Mapping and previews
// ============================================================================

fn map_position(
    wallet: Address,
    props: &PositionProps,
    market: &GmxMarket,
    collateral: &TokenRef,
    factors: &MarketFactors,
    tickers: &HashMap<Address, Ticker>,
) -> AdapterResult<PositionInfo> {
    let side = if props.flags.isLong { Side::Long } else { Side::Short };
    let size_usd = from_units(props.numbers.sizeInUsd, USD_DECIMALS)?;
    let size_tokens = from_units(props.numbers.sizeInTokens, market.index.decimals)?;
    let collateral_amount = from_units(props.numbers.collateralAmount, collateral.decimals)?;
    let margin_usd = collateral_amount * token_price(tickers, collateral)?;
    let mark = token_price(tickers, &market.index)?;

    let entry = if size_tokens.is_zero() {
        Decimal::ZERO
    } else {
        size_usd / size_tokens
    };
    let borrowing = math::pending_borrowing_fee_usd(
        size_usd,
        factors.cumulative_borrowing(side),
        from_units(props.numbers.borrowingFactor, USD_DECIMALS)?,
    );
    let closing_fee = math::position_fee_usd(size_usd, factors.position_fee_factor);

    Ok(PositionInfo {
        position_id: keys::position_key(wallet, market.market_token, collateral.address, side.is_long()).to_string(),
        market_id: market.info.market_id.clone(),
        side,
        size_tokens,
        size_usd,
        margin_usd,
        avg_entry_price: entry,
        mark_price: mark,
        leverage: math::leverage(size_usd, margin_usd).unwrap_or_default(),
        liquidation_price: math::liquidation_price(
            side,
            size_usd,
            size_tokens,
            margin_usd,
            borrowing + closing_fee,
            factors.min_collateral_factor,
            factors.min_collateral_usd,
        ),
        unrealized_pnl: math::pnl_usd(side, size_usd, size_tokens, mark),
        accrued_funding: Decimal::ZERO,
        accrued_borrowing: borrowing,
        collateral_token: collateral.symbol.clone(),
    })
}

fn map_order(
    key: B256,
    order: &OrderProps,
    market: &GmxMarket,
    tickers: &HashMap<Address, Ticker>,
) -> AdapterResult<Option<OrderInfo>> {
    let Some(gmx_type) = GmxOrderType::from_u8(order.numbers.orderType) else {
        return Ok(None);
    };
    let Some(order_type) = common_order_type(gmx_type) else {
        return Ok(None);
    };
    let collateral_decimals = market
        .collateral_by_address(order.addresses.initialCollateralToken)
        .map_or(18, |t| t.decimals);

    let size_usd = from_units(order.numbers.sizeDeltaUsd, USD_DECIMALS)?;
    let trigger_price = if order.numbers.triggerPrice.is_zero() {
        None
    } else {
        Some(from_gmx_price(order.numbers.triggerPrice, market.index.decimals)?)
    };
    let reference = match trigger_price {
        Some(price) => price,
        None => token_price(tickers, &market.index)?,
    };

    Ok(Some(OrderInfo {
        order_id: key.to_string(),
        market_id: market.info.market_id.clone(),
        side: if order.flags.isLong { Side::Long } else { Side::Short },
        order_type,
        size_tokens: if reference.is_zero() {
            Decimal::ZERO
        } else {
            size_usd / reference
        },
        size_usd,
        trigger_price,
        margin_delta: from_units(order.numbers.initialCollateralDeltaAmount, collateral_decimals)?,
        reduce_only: gmx_type.is_decrease(),
        status: if order_type == OrderType::Market {
            OrderStatus::Pending
        } else {
            OrderStatus::Open
        },
        created_at: None,
    }))
}

pub(crate) fn open_preview(
    order: &CreateOrder,
    existing: Option<&PositionInfo>,
    market: &MarketInfo,
    factors: &MarketFactors,
    price: Decimal,
    margin_in_usd: Decimal,
) -> OpenTradePreview {
    let added_usd = order.size_usd_at(price);
    let added_tokens = order.size_tokens_at(price);
    let fee = math::position_fee_usd(added_usd, factors.position_fee_factor);

    let (base_usd, base_tokens, base_margin) =
        existing.map_or((Decimal::ZERO, Decimal::ZERO, Decimal::ZERO), |p| {
            (p.size_usd, p.size_tokens, p.margin_usd)
        });
    let size_usd = base_usd + added_usd;
    let size_tokens = base_tokens + added_tokens;
    let margin_usd = base_margin + margin_in_usd - fee;

    let preview = OpenTradePreview {
        market_id: order.market_id.clone(),
        side: order.side,
        size_tokens,
        size_usd,
        margin_usd,
        leverage: math::leverage(size_usd, margin_usd).unwrap_or_default(),
        avg_entry_price: if size_tokens.is_zero() {
            price
        } else {
            size_usd / size_tokens
        },
        liquidation_price: math::liquidation_price(
            order.side,
            size_usd,
            size_tokens,
            margin_usd,
            Decimal::ZERO,
            factors.min_collateral_factor,
            factors.min_collateral_usd,
        ),
        fee_usd: fee,
        is_valid: true,
        error_message: None,
    };

    if existing.is_some_and(|p| p.side != order.side) {
        return preview.invalid("an opposite position is open in this market");
    }
    if let Err(err) = validate_create_order(order, market, price, margin_in_usd) {
        return preview.invalid(err.to_string());
    }
    if margin_usd <= Decimal::ZERO {
        return preview.invalid("fees exceed the provided margin");
    }
    preview
}

pub(crate) fn close_preview(
    position: &PositionInfo,
    close: &ClosePosition,
    market: &MarketInfo,
    factors: &MarketFactors,
) -> CloseTradePreview {
    let price = close.trigger_price.unwrap_or(position.mark_price);
    let full = close.is_full_close(position);
    let close_tokens = close.close_size.min(position.size_tokens);
    let fraction = if position.size_tokens.is_zero() {
        Decimal::ONE
    } else {
        close_tokens / position.size_tokens
    };
    let closed_usd = position.size_usd * fraction;
    let pnl = math::pnl_usd(position.side, closed_usd, close_tokens, price);
    let fee = math::position_fee_usd(closed_usd, factors.position_fee_factor);
    let borrowing = position.accrued_borrowing * fraction;
    let net = pnl - fee - borrowing;

    let remaining_tokens = position.size_tokens - close_tokens;
    let remaining_usd = position.size_usd - closed_usd;
    let (received, remaining_margin) = if full {
        ((position.margin_usd + net).max(Decimal::ZERO), Decimal::ZERO)
    } else if net >= Decimal::ZERO {
        (net, position.margin_usd)
    } else {
        (Decimal::ZERO, position.margin_usd + net)
    };

    let mut preview = CloseTradePreview {
        market_id: position.market_id.clone(),
        side: position.side,
        remaining_size_tokens: remaining_tokens,
        remaining_margin_usd: remaining_margin,
        leverage: math::leverage(remaining_usd, remaining_margin).unwrap_or_default(),
        liquidation_price: (!full)
            .then(|| {
                math::liquidation_price(
                    position.side,
                    remaining_usd,
                    remaining_tokens,
                    remaining_margin,
                    Decimal::ZERO,
                    factors.min_collateral_factor,
                    factors.min_collateral_usd,
                )
            })
            .flatten(),
        realized_pnl: pnl,
        received_margin_usd: received,
        fee_usd: fee,
        is_valid: true,
        error_message: None,
    };

    let reason = match validate_close(close, position) {
        Err(err) => Some(err.to_string()),
        Ok(()) if !full && remaining_usd < market.min_position_size_usd => Some(format!(
            "remaining size {remaining_usd} USD is below the minimum {} USD",
            market.min_position_size_usd
        )),
        Ok(()) if !full && remaining_margin <= Decimal::ZERO => {
            Some("losses exceed the remaining margin".to_string())
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
    delta_usd: Decimal,
    market: &MarketInfo,
    factors: &MarketFactors,
) -> MarginPreview {
    let margin_usd = position.margin_usd + delta_usd;
    let leverage = math::leverage(position.size_usd, margin_usd).unwrap_or_default();
    let mut preview = MarginPreview {
        market_id: position.market_id.clone(),
        margin_usd,
        leverage,
        liquidation_price: math::liquidation_price(
            position.side,
            position.size_usd,
            position.size_tokens,
            margin_usd,
            position.accrued_borrowing,
            factors.min_collateral_factor,
            factors.min_collateral_usd,
        ),
        is_valid: true,
        error_message: None,
    };

    let reason = match validate_margin_update(update, position) {
        Err(err) => Some(err.to_string()),
        Ok(()) if margin_usd <= Decimal::ZERO => Some("margin would be exhausted".to_string()),
        Ok(()) if leverage > market.max_leverage => Some(format!(
            "leverage {leverage:.2}x exceeds maximum {}x",
            market.max_leverage
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
    use alloy_primitives::address;
    use rust_decimal_macros::dec;

    use crate::infrastructure::protocols::gmx_v2::config::{ExecutionFeeConfig, GmxV2Contracts};

    const WETH: Address = address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1");
    const USDC: Address = address!("af88d065e77c8cC2239327C5EDb3A432268e5831");

    fn config() -> GmxV2Config {
        GmxV2Config {
            enabled: true,
            network: "arbitrum".to_string(),
            api_url: "http://localhost".to_string(),
            contracts: GmxV2Contracts {
                data_store: Address::repeat_byte(1),
                reader: Address::repeat_byte(2),
                exchange_router: Address::repeat_byte(3),
                router: Address::repeat_byte(4),
                order_vault: Address::repeat_byte(5),
            },
            wrapped_native_token: WETH,
            execution_fee: ExecutionFeeConfig::default(),
            default_slippage: dec!(0.005),
            referral_code: B256::ZERO,
            ui_fee_receiver: Address::ZERO,
            max_entries: 200,
            min_leverage: dec!(1.1),
            max_leverage: dec!(100),
            min_position_size_usd: dec!(2),
            min_collateral_usd: dec!(1),
            maker_fee: dec!(0.0005),
            taker_fee: dec!(0.0007),
        }
    }

    fn eth_market() -> GmxMarket {
        let token = |symbol: &str, address, decimals| TokenRef {
            symbol: symbol.to_string(),
            address,
            decimals,
        };
        let market_token = Address::repeat_byte(0x70);
        let eth = token("ETH", WETH, 18);
        let usdc = token("USDC", USDC, 6);
        GmxMarket {
            info: MarketInfo {
                market_id: MarketId::new(Chain::ARBITRUM, ProtocolId::GmxV2, market_token.to_checksum(None)),
                protocol: ProtocolId::GmxV2,
                chain: Chain::ARBITRUM,
                index_token: eth.info(),
                long_collateral: vec![eth.info(), usdc.info()],
                short_collateral: vec![eth.info(), usdc.info()],
                min_leverage: dec!(1.1),
                max_leverage: dec!(100),
                min_initial_margin_usd: dec!(1),
                min_position_size_usd: dec!(2),
                maker_fee: dec!(0.0005),
                taker_fee: dec!(0.0007),
                price_precision: Decimal::new(1, 8),
                size_precision: Decimal::new(1, 18),
                supports_limit_orders: true,
                supports_partial_close: true,
            },
            market_token,
            index: eth.clone(),
            long: eth,
            short: usdc,
        }
    }

    fn factors() -> MarketFactors {
        MarketFactors {
            min_collateral_factor: dec!(0.01),
            position_fee_factor: dec!(0.0007),
            min_collateral_usd: dec!(1),
            ..MarketFactors::default()
        }
    }

    fn position(side: Side) -> PositionInfo {
        PositionInfo {
            position_id: "0x01".to_string(),
            market_id: eth_market().info.market_id,
            side,
            size_tokens: dec!(5),
            size_usd: dec!(10000),
            margin_usd: dec!(1000),
            avg_entry_price: dec!(2000),
            mark_price: dec!(2200),
            leverage: dec!(10),
            liquidation_price: None,
            unrealized_pnl: dec!(1000),
            accrued_funding: Decimal::ZERO,
            accrued_borrowing: Decimal::ZERO,
            collateral_token: "USDC".to_string(),
        }
    }

    #[test]
    fn order_types_map_to_gmx() {
        assert_eq!(open_order_type(OrderType::Market, false), GmxOrderType::MarketIncrease);
        assert_eq!(open_order_type(OrderType::Limit, false), GmxOrderType::LimitIncrease);
        assert_eq!(open_order_type(OrderType::Market, true), GmxOrderType::MarketDecrease);
        assert_eq!(open_order_type(OrderType::StopLoss, false), GmxOrderType::StopLossDecrease);
        assert_eq!(close_order_type(OrderType::TakeProfit), GmxOrderType::LimitDecrease);
        assert_eq!(common_order_type(GmxOrderType::MarketSwap), None);
    }

    #[test]
    fn erc20_collateral_is_sent_with_send_tokens() {
        let market = eth_market();
        let cfg = config();
        let request = OrderRequest {
            collateral: &market.short,
            side: Side::Long,
            order_type: GmxOrderType::MarketIncrease,
            size_delta_usd: dec!(1000),
            collateral_in: U256::from(100_000_000u64),
            collateral_out: U256::ZERO,
            trigger_price: None,
            acceptable_price: dec!(2010),
            execution_fee: U256::from(1_000u64),
        };
        let tx = build_order_tx(&cfg, Chain::ARBITRUM, Address::repeat_byte(9), &market, &request).unwrap();
        assert_eq!(tx.to, cfg.contracts.exchange_router);
        assert_eq!(tx.value, U256::from(1_000u64));
        assert_eq!(tx.heading, "Increase ETH LONG");

        let decoded = IExchangeRouter::multicallCall::abi_decode(&tx.data, true).unwrap();
        assert_eq!(decoded.data.len(), 3);
        assert_eq!(&decoded.data[0][..4], IExchangeRouter::sendWntCall::SELECTOR.as_slice());
        assert_eq!(&decoded.data[1][..4], IExchangeRouter::sendTokensCall::SELECTOR.as_slice());

        let create = IExchangeRouter::createOrderCall::abi_decode(&decoded.data[2], true).unwrap();
        assert_eq!(create.params.orderType, GmxOrderType::MarketIncrease as u8);
        assert!(create.params.isLong);
        assert_eq!(create.params.addresses.initialCollateralToken, USDC);
        assert_eq!(
            create.params.numbers.sizeDeltaUsd,
            U256::from(1000u64) * crate::infrastructure::evm::units::pow10(30)
        );
        // 2010 USD per ETH at 30 - 18 = 12 decimals
        assert_eq!(
            create.params.numbers.acceptablePrice,
            U256::from(2010u64) * crate::infrastructure::evm::units::pow10(12)
        );
    }

    #[test]
    fn native_collateral_rides_on_send_wnt() {
        let market = eth_market();
        let request = OrderRequest {
            collateral: &market.long,
            side: Side::Short,
            order_type: GmxOrderType::MarketIncrease,
            size_delta_usd: dec!(500),
            collateral_in: U256::from(10u64),
            collateral_out: U256::ZERO,
            trigger_price: None,
            acceptable_price: dec!(1990),
            execution_fee: U256::from(5u64),
        };
        let tx = build_order_tx(&config(), Chain::ARBITRUM, Address::ZERO, &market, &request).unwrap();
        assert_eq!(tx.value, U256::from(15u64));
        let decoded = IExchangeRouter::multicallCall::abi_decode(&tx.data, true).unwrap();
        assert_eq!(decoded.data.len(), 2);
        let create = IExchangeRouter::createOrderCall::abi_decode(&decoded.data[1], true).unwrap();
        assert!(create.params.shouldUnwrapNativeToken);
    }

    #[test]
    fn open_preview_adds_to_existing_position() {
        let market = eth_market();
        let order = CreateOrder::market(market.info.market_id.clone(), Side::Long, dec!(10000), dec!(1000), "USDC");
        let preview = open_preview(&order, None, &market.info, &factors(), dec!(2000), dec!(1000));
        assert!(preview.is_valid, "{:?}", preview.error_message);
        assert_eq!(preview.size_tokens, dec!(5));
        assert_eq!(preview.fee_usd, dec!(7));
        assert_eq!(preview.margin_usd, dec!(993));
        assert!(preview.liquidation_price.is_some_and(|p| p < dec!(2000)));

        let existing = position(Side::Long);
        let merged = open_preview(&order, Some(&existing), &market.info, &factors(), dec!(2000), dec!(1000));
        assert_eq!(merged.size_usd, dec!(20000));
        assert_eq!(merged.size_tokens, dec!(10));
    }

    #[test]
    fn open_preview_rejects_opposite_position() {
        let market = eth_market();
        let order = CreateOrder::market(market.info.market_id.clone(), Side::Short, dec!(1000), dec!(100), "USDC");
        let preview = open_preview(&order, Some(&position(Side::Long)), &market.info, &factors(), dec!(2000), dec!(100));
        assert!(!preview.is_valid);
    }

    #[test]
    fn open_preview_rejects_excess_leverage() {
        let market = eth_market();
        let order = CreateOrder::market(market.info.market_id.clone(), Side::Long, dec!(100000), dec!(10), "USDC");
        let preview = open_preview(&order, None, &market.info, &factors(), dec!(2000), dec!(10));
        assert!(!preview.is_valid);
        assert!(preview.error_message.unwrap().contains("leverage"));
    }

    #[test]
    fn full_close_returns_margin_plus_pnl() {
        let market = eth_market();
        let pos = position(Side::Long);
        let close = ClosePosition::market(dec!(5), dec!(0.01));
        let preview = close_preview(&pos, &close, &market.info, &factors());
        assert!(preview.is_valid);
        // pnl = 5 * 2200 - 10000 = 1000, fee = 7
        assert_eq!(preview.realized_pnl, dec!(1000));
        assert_eq!(preview.received_margin_usd, dec!(1993));
        assert_eq!(preview.remaining_size_tokens, Decimal::ZERO);
        assert_eq!(preview.liquidation_price, None);
    }

    #[test]
    fn partial_losing_close_is_paid_from_margin() {
        let market = eth_market();
        let mut pos = position(Side::Long);
        pos.mark_price = dec!(1900);
        let close = ClosePosition::market(dec!(2.5), dec!(0.01));
        let preview = close_preview(&pos, &close, &market.info, &factors());
        // half closed: pnl = 2.5 * 1900 - 5000 = -250, fee = 3.5
        assert_eq!(preview.realized_pnl, dec!(-250));
        assert_eq!(preview.received_margin_usd, Decimal::ZERO);
        assert_eq!(preview.remaining_margin_usd, dec!(746.5));
        assert_eq!(preview.remaining_size_tokens, dec!(2.5));
    }

    #[test]
    fn margin_withdrawal_past_max_leverage_is_invalid() {
        let market = eth_market();
        let pos = position(Side::Short);
        let update = UpdatePositionMargin {
            margin_delta: dec!(950),
            is_deposit: false,
            collateral_token: "USDC".to_string(),
        };
        let preview = margin_preview(&pos, &update, dec!(-950), &market.info, &factors());
        assert_eq!(preview.margin_usd, dec!(50));
        assert_eq!(preview.leverage, dec!(200));
        assert!(!preview.is_valid);
    }

    #[test]
    fn single_token_pools_halve_open_interest() {
        let mut market = eth_market();
        market.short = market.long.clone();
        let mut raw = [U256::ZERO; FACTOR_CALLS];
        raw[0] = U256::from(100u64) * crate::infrastructure::evm::units::pow10(30);
        raw[1] = raw[0];
        let factors = MarketFactors::from_raw(&market, &raw, dec!(1)).unwrap();
        assert_eq!(factors.long_open_interest_usd, dec!(100));
        assert_eq!(factors.min_collateral_usd, dec!(1));
    }
}
