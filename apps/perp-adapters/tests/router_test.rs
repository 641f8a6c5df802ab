//! Router assembled from configuration, with venues served by mock servers.

use perp_adapters::domain::{Chain, MarketId, ProtocolId};
use perp_adapters::{AdapterError, build_router, load_config_from_string};
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WALLET: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

fn config_yaml(aevo: &MockServer, orderly: &MockServer) -> String {
    format!(
        "networks:
  arbitrum:
    chain_id: 42161
    rpc_url: {orderly}
http:
  timeout_ms: 2000
  retry:
    max_attempts: 1
protocols:
  aevo:
    enabled: true
    base_url: {aevo}
    wallet_address: '{WALLET}'
  orderly:
    enabled: true
    network: arbitrum
    base_url: {orderly}
    account_address: '{WALLET}'
    vault: '0x816f722424B49Cf1275cc86DA9840Fbd5a6167e9'
    usdc: '0xaf88d065e77c8cC2239327C5EDb3A432268e5831'
",
        aevo = aevo.uri(),
        orderly = orderly.uri(),
    )
}

async fn mount_aevo_markets(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/markets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "instrument_id": "1",
            "instrument_name": "ETH-PERP",
            "instrument_type": "PERPETUAL",
            "underlying_asset": "ETH",
            "price_step": "0.01",
            "amount_step": "0.01",
            "min_order_value": "10",
            "max_leverage": "20",
            "mark_price": "2000"
        }])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn failing_venue_is_reported_next_to_healthy_results() {
    let aevo = MockServer::start().await;
    let orderly = MockServer::start().await;
    mount_aevo_markets(&aevo).await;
    Mock::given(method("GET"))
        .and(path("/v1/public/info"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&orderly)
        .await;

    let config = load_config_from_string(&config_yaml(&aevo, &orderly)).unwrap();
    let router = build_router(&config).unwrap();
    assert_eq!(router.protocols().len(), 2);

    let markets = router.get_all_markets(None).await;
    assert_eq!(markets.items.len(), 1);
    assert_eq!(markets.items[0].protocol, ProtocolId::Aevo);
    assert!(!markets.is_complete());
    assert_eq!(markets.failures.len(), 1);
    assert_eq!(markets.failures[0].protocol, ProtocolId::Orderly);
    assert!(matches!(markets.failures[0].error, AdapterError::Http(_)));
}

#[tokio::test]
async fn protocol_filter_limits_the_fan_out() {
    let aevo = MockServer::start().await;
    let orderly = MockServer::start().await;
    mount_aevo_markets(&aevo).await;

    let config = load_config_from_string(&config_yaml(&aevo, &orderly)).unwrap();
    let router = build_router(&config).unwrap();

    let markets = router.get_all_markets(Some(&[ProtocolId::Aevo])).await;
    assert!(markets.is_complete());
    assert_eq!(markets.items.len(), 1);
}

#[tokio::test]
async fn prices_are_routed_by_market_protocol() {
    let aevo = MockServer::start().await;
    let orderly = MockServer::start().await;
    mount_aevo_markets(&aevo).await;

    let config = load_config_from_string(&config_yaml(&aevo, &orderly)).unwrap();
    let router = build_router(&config).unwrap();

    let eth = MarketId::new(Chain::ETHEREUM, ProtocolId::Aevo, "ETH-PERP");
    let prices = router.get_market_prices(&[eth]).await.unwrap();
    assert_eq!(prices, vec![dec!(2000)]);

    let gmx = MarketId::new(Chain::ARBITRUM, ProtocolId::GmxV2, "0x70d95587d40A2caf56bd97485aB3Eec10Bee6336");
    let result = router.get_market_prices(&[gmx]).await;
    assert!(matches!(result, Err(AdapterError::Validation(_))));
}

#[test]
fn enabled_protocol_without_network_fails_validation() {
    let yaml = format!(
        "protocols:
  orderly:
    enabled: true
    network: base
    account_address: '{WALLET}'
    vault: '0x816f722424B49Cf1275cc86DA9840Fbd5a6167e9'
    usdc: '0xaf88d065e77c8cC2239327C5EDb3A432268e5831'
"
    );
    assert!(load_config_from_string(&yaml).is_err());
}
