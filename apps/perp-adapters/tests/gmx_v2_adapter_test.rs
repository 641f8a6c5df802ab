//! GMX v2 adapter against a mocked REST API and JSON-RPC node.

use alloy::sol_types::{SolCall, SolValue};
use alloy_primitives::{Address, B256, Bytes, U256, address, hex};
use perp_adapters::config::{CacheConfig, HttpSettings, NetworkConfig};
use perp_adapters::domain::{CancelOrder, Chain, CreateOrder, MarketId, ProtocolId, RouterOutput, Side};
use perp_adapters::infrastructure::evm::MULTICALL3_ADDRESS;
use perp_adapters::infrastructure::evm::multicall::{Result3, aggregate3Call};
use perp_adapters::infrastructure::protocols::gmx_v2::contracts::{IReader, MarketProps};
use perp_adapters::infrastructure::protocols::gmx_v2::{GmxV2Adapter, GmxV2Config};
use perp_adapters::{AdapterError, PerpsAdapter};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ETH_USD_MARKET: Address = address!("70d95587d40A2caf56bd97485aB3Eec10Bee6336");
const WETH: Address = address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1");
const USDC: Address = address!("af88d065e77c8cC2239327C5EDb3A432268e5831");
const EXCHANGE_ROUTER: Address = address!("69C527fC77291722b52649E45c838e41be8Bf5d5");

fn eth_usd() -> MarketId {
    MarketId::new(Chain::ARBITRUM, ProtocolId::GmxV2, ETH_USD_MARKET.to_checksum(None))
}

fn network(server: &MockServer, chain_id: u64) -> NetworkConfig {
    NetworkConfig {
        chain_id,
        rpc_url: server.uri(),
        multicall: MULTICALL3_ADDRESS,
    }
}

fn config(server: &MockServer) -> GmxV2Config {
    serde_yaml_bw::from_str(&format!(
        "enabled: true
network: arbitrum
api_url: {}
wrapped_native_token: '{WETH}'
contracts:
  data_store: '0xFD70de6b91282D8017aA4E741e9Ae325CAb992d8'
  reader: '0xf60becbba223EEA9495Da3f606753867eC10d139'
  exchange_router: '{EXCHANGE_ROUTER}'
  router: '0x7452c558d45f8afC8c83dAe62C3f8A5BE19c71f6'
  order_vault: '0x31eF83a530Fde1B38EE9A18093A333D8Bbbc40D5'
",
        server.uri()
    ))
    .unwrap()
}

fn adapter(server: &MockServer) -> GmxV2Adapter {
    GmxV2Adapter::new(
        config(server),
        &network(server, 42_161),
        &HttpSettings::default(),
        &CacheConfig::default(),
    )
    .unwrap()
}

async fn mount_markets(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tokens": [
                { "symbol": "ETH", "address": WETH, "decimals": 18 },
                { "symbol": "USDC", "address": USDC, "decimals": 6 }
            ]
        })))
        .mount(server)
        .await;

    let markets = vec![
        MarketProps {
            marketToken: ETH_USD_MARKET,
            indexToken: WETH,
            longToken: WETH,
            shortToken: USDC,
        },
        // swap-only
        MarketProps {
            marketToken: Address::repeat_byte(0x55),
            indexToken: Address::ZERO,
            longToken: WETH,
            shortToken: USDC,
        },
    ];
    let result = hex::encode_prefixed(IReader::getMarketsCall::abi_encode_returns(&(markets,)));
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_call" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": result
        })))
        .mount(server)
        .await;
}

async fn mount_tickers(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/prices/tickers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "tokenAddress": WETH,
                "tokenSymbol": "ETH",
                "minPrice": "1999000000000000",
                "maxPrice": "2001000000000000"
            },
            {
                "tokenAddress": USDC,
                "tokenSymbol": "USDC",
                "minPrice": "1000000000000000000000000",
                "maxPrice": "1000000000000000000000000"
            }
        ])))
        .mount(server)
        .await;
}

fn rpc_result(result: impl AsRef<[u8]>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": hex::encode_prefixed(result)
    }))
}

/// DataStore factor batch: 18 market reads plus the global minimum collateral.
async fn mount_factors(server: &MockServer, reverted: Option<usize>) {
    let results: Vec<Result3> = (0..19)
        .map(|i| Result3 {
            success: Some(i) != reverted,
            returnData: Bytes::from(U256::ZERO.abi_encode()),
        })
        .collect();
    Mock::given(method("POST"))
        .and(body_string_contains(hex::encode(aggregate3Call::SELECTOR)))
        .respond_with(rpc_result(aggregate3Call::abi_encode_returns(&(results,))))
        .with_priority(1)
        .mount(server)
        .await;
}

async fn mount_wallet(server: &MockServer, usdc_balance: u64) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_gasPrice" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": "0x5f5e100"
        })))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getBalance" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": "0xde0b6b3a7640000"
        })))
        .with_priority(1)
        .mount(server)
        .await;
    // balanceOf(address)
    Mock::given(method("POST"))
        .and(body_string_contains("0x70a08231"))
        .respond_with(rpc_result(U256::from(usdc_balance).abi_encode()))
        .with_priority(1)
        .mount(server)
        .await;
    // allowance(address,address)
    Mock::given(method("POST"))
        .and(body_string_contains("0xdd62ed3e"))
        .respond_with(rpc_result(U256::MAX.abi_encode()))
        .with_priority(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn markets_come_from_the_reader() {
    let server = MockServer::start().await;
    mount_markets(&server).await;

    let markets = adapter(&server).get_all_markets().await.unwrap();
    assert_eq!(markets.len(), 1);
    let market = &markets[0];
    assert_eq!(market.market_id, eth_usd());
    assert_eq!(market.index_token.symbol, "ETH");
    assert_eq!(market.long_collateral.len(), 2);
    assert_eq!(market.index_token.address, Some(WETH));
}

#[tokio::test]
async fn prices_are_ticker_mids() {
    let server = MockServer::start().await;
    mount_markets(&server).await;
    mount_tickers(&server).await;

    let prices = adapter(&server).get_market_prices(&[eth_usd()]).await.unwrap();
    assert_eq!(prices, vec![dec!(2000)]);
}

#[tokio::test]
async fn unknown_market_is_not_found() {
    let server = MockServer::start().await;
    mount_markets(&server).await;
    mount_tickers(&server).await;

    let other = MarketId::new(Chain::ARBITRUM, ProtocolId::GmxV2, Address::repeat_byte(0x77).to_checksum(None));
    let result = adapter(&server).get_market_prices(&[other]).await;
    assert!(matches!(result, Err(AdapterError::MarketNotFound(_))));
}

#[tokio::test]
async fn market_state_reads_datastore_factors() {
    let server = MockServer::start().await;
    mount_markets(&server).await;
    mount_tickers(&server).await;
    mount_factors(&server, None).await;

    let states = adapter(&server).get_markets_state(&[eth_usd()]).await.unwrap();
    assert_eq!(states[0].price, dec!(2000));
    assert_eq!(states[0].long_funding_rate, Decimal::ZERO);
    assert_eq!(states[0].available_liquidity_usd, None);
}

#[tokio::test]
async fn reverted_datastore_read_fails_market_state() {
    let server = MockServer::start().await;
    mount_markets(&server).await;
    mount_tickers(&server).await;
    mount_factors(&server, Some(4)).await;

    let result = adapter(&server).get_markets_state(&[eth_usd()]).await;
    assert!(matches!(result, Err(AdapterError::Rpc(_))), "{result:?}");
}

#[tokio::test]
async fn single_order_within_balance_is_built() {
    let server = MockServer::start().await;
    mount_markets(&server).await;
    mount_tickers(&server).await;
    mount_wallet(&server, 1_000_000_000).await;

    let order = CreateOrder::market(eth_usd(), Side::Long, dec!(3000), dec!(600), "USDC");
    let outputs = adapter(&server).create_order(Address::repeat_byte(1), &[order]).await.unwrap();
    assert_eq!(outputs.len(), 1);
    assert!(matches!(outputs[0], RouterOutput::Transaction(_)));
}

#[tokio::test]
async fn batch_cannot_spend_more_collateral_than_the_wallet_holds() {
    let server = MockServer::start().await;
    mount_markets(&server).await;
    mount_tickers(&server).await;
    mount_wallet(&server, 1_000_000_000).await;

    // 600 USDC each against a 1000 USDC balance
    let order = CreateOrder::market(eth_usd(), Side::Long, dec!(3000), dec!(600), "USDC");
    let result = adapter(&server)
        .create_order(Address::repeat_byte(1), &[order.clone(), order])
        .await;
    assert!(matches!(result, Err(AdapterError::InsufficientBalance { .. })), "{result:?}");
}

#[tokio::test]
async fn cancel_is_an_exchange_router_transaction() {
    let server = MockServer::start().await;
    let key = B256::repeat_byte(0xab);
    let cancel = CancelOrder {
        order_id: key.to_string(),
        market_id: eth_usd(),
    };

    let outputs = adapter(&server).cancel_order(Address::repeat_byte(1), &[cancel]).await.unwrap();
    let [RouterOutput::Transaction(tx)] = outputs.as_slice() else {
        panic!("expected one transaction, got {outputs:?}");
    };
    assert_eq!(tx.to, EXCHANGE_ROUTER);
    assert_eq!(tx.chain, Chain::ARBITRUM);
    assert!(tx.value.is_zero());
    assert!(tx.data.len() > 4);
}

#[tokio::test]
async fn malformed_order_keys_are_rejected() {
    let server = MockServer::start().await;
    let cancel = CancelOrder {
        order_id: "not-a-key".to_string(),
        market_id: eth_usd(),
    };
    let result = adapter(&server).cancel_order(Address::repeat_byte(1), &[cancel]).await;
    assert!(matches!(result, Err(AdapterError::Validation(_))));
}

#[test]
fn unsupported_networks_are_refused() {
    let server_uri = "http://127.0.0.1:1";
    let network = NetworkConfig {
        chain_id: 10,
        rpc_url: server_uri.to_string(),
        multicall: MULTICALL3_ADDRESS,
    };
    let mut config: GmxV2Config = serde_yaml_bw::from_str(&format!(
        "network: optimism
wrapped_native_token: '{WETH}'
contracts:
  data_store: '{0}'
  reader: '{0}'
  exchange_router: '{0}'
  router: '{0}'
  order_vault: '{0}'
",
        Address::repeat_byte(1)
    ))
    .unwrap();
    config.enabled = true;

    let result = GmxV2Adapter::new(config, &network, &HttpSettings::default(), &CacheConfig::default());
    assert!(matches!(result, Err(AdapterError::UnsupportedNetwork { chain_id: 10, .. })));
}
