//! Orderly adapter against a mocked REST API.

use alloy_primitives::Address;
use perp_adapters::config::{CacheConfig, HttpSettings, NetworkConfig};
use perp_adapters::domain::{
    CancelOrder, Chain, CreateOrder, MarketId, OrderType, ProtocolId, RouterOutput, Side, UpdateOrder,
};
use perp_adapters::infrastructure::evm::MULTICALL3_ADDRESS;
use perp_adapters::infrastructure::protocols::orderly::{OrderlyAdapter, OrderlyConfig};
use perp_adapters::{AdapterError, PerpsAdapter};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WALLET: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

fn wallet() -> Address {
    WALLET.parse().unwrap()
}

fn eth_perp() -> MarketId {
    MarketId::new(Chain::ARBITRUM, ProtocolId::Orderly, "PERP_ETH_USDC")
}

fn secret() -> String {
    format!("ed25519:{}", bs58::encode([7u8; 32]).into_string())
}

fn adapter(server: &MockServer, with_key: bool) -> OrderlyAdapter {
    let mut yaml = format!(
        "enabled: true\nnetwork: arbitrum\nbase_url: {}\naccount_address: '{WALLET}'\n\
         vault: '0x816f722424B49Cf1275cc86DA9840Fbd5a6167e9'\nusdc: '0xaf88d065e77c8cC2239327C5EDb3A432268e5831'\n",
        server.uri()
    );
    if with_key {
        yaml.push_str(&format!("orderly_secret: '{}'\n", secret()));
    }
    let config: OrderlyConfig = serde_yaml_bw::from_str(&yaml).unwrap();
    let network = NetworkConfig {
        chain_id: 42_161,
        rpc_url: server.uri(),
        multicall: MULTICALL3_ADDRESS,
    };
    OrderlyAdapter::new(config, &network, &HttpSettings::default(), &CacheConfig::default()).unwrap()
}

async fn mount_public(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/public/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "rows": [{
                "symbol": "PERP_ETH_USDC",
                "quote_tick": 0.01,
                "base_min": 0.001,
                "base_tick": 0.0001,
                "min_notional": 10,
                "base_imr": 0.04,
                "base_mmr": 0.025,
                "imr_factor": 0
            }]}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/public/futures"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "rows": [{
                "symbol": "PERP_ETH_USDC",
                "index_price": 1999.5,
                "mark_price": 2000,
                "est_funding_rate": 0.0008,
                "open_interest": 150
            }]}
        })))
        .mount(server)
        .await;
}

async fn mount_positions(server: &MockServer, free_collateral: f64) {
    Mock::given(method("GET"))
        .and(path("/v1/positions"))
        .and(header_exists("orderly-signature"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "free_collateral": free_collateral,
                "total_collateral_value": 1500,
                "current_margin_ratio_with_orders": 3.5,
                "rows": [
                    {
                        "symbol": "PERP_ETH_USDC",
                        "position_qty": -1.5,
                        "average_open_price": 2100,
                        "mark_price": 2000,
                        "est_liq_price": 2600,
                        "imr": 0.1,
                        "mmr": 0.05
                    },
                    {
                        "symbol": "PERP_BTC_USDC",
                        "position_qty": 0,
                        "average_open_price": 0,
                        "mark_price": 60000,
                        "imr": 0.1,
                        "mmr": 0.05
                    }
                ]
            }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn lists_markets_with_leverage_from_imr() {
    let server = MockServer::start().await;
    mount_public(&server).await;

    let markets = adapter(&server, false).get_all_markets().await.unwrap();
    assert_eq!(markets.len(), 1);
    assert_eq!(markets[0].market_id, eth_perp());
    assert_eq!(markets[0].index_token.symbol, "ETH");
    assert_eq!(markets[0].max_leverage, dec!(25));
    assert_eq!(markets[0].min_position_size_usd, dec!(10));
}

#[tokio::test]
async fn funding_is_converted_to_hourly() {
    let server = MockServer::start().await;
    mount_public(&server).await;

    let states = adapter(&server, false).get_markets_state(&[eth_perp()]).await.unwrap();
    assert_eq!(states[0].price, dec!(2000));
    assert_eq!(states[0].long_funding_rate, dec!(0.0001));
    assert_eq!(states[0].short_funding_rate, dec!(-0.0001));
    assert_eq!(states[0].long_open_interest_usd, dec!(300000));
}

#[tokio::test]
async fn unknown_symbols_are_not_found() {
    let server = MockServer::start().await;
    mount_public(&server).await;

    let missing = MarketId::new(Chain::ARBITRUM, ProtocolId::Orderly, "PERP_DOGE_USDC");
    let result = adapter(&server, false).get_market_prices(&[missing]).await;
    assert!(matches!(result, Err(AdapterError::MarketNotFound(_))));
}

#[tokio::test]
async fn account_endpoints_need_the_orderly_key() {
    let server = MockServer::start().await;
    let result = adapter(&server, false).get_all_positions(wallet()).await;
    assert!(matches!(result, Err(AdapterError::Config(_))), "{result:?}");
}

#[tokio::test]
async fn positions_skip_flat_rows() {
    let server = MockServer::start().await;
    mount_positions(&server, 900.0).await;

    let positions = adapter(&server, true).get_all_positions(wallet()).await.unwrap();
    assert_eq!(positions.len(), 1);
    let short = &positions[0];
    assert_eq!(short.side, Side::Short);
    assert_eq!(short.size_tokens, dec!(1.5));
    assert_eq!(short.margin_usd, dec!(300));
    assert_eq!(short.leverage, dec!(10));
    assert_eq!(short.unrealized_pnl, dec!(150));
    assert_eq!(short.liquidation_price, Some(dec!(2600)));
}

#[tokio::test]
async fn limit_order_is_posted_signed() {
    let server = MockServer::start().await;
    mount_public(&server).await;
    mount_positions(&server, 1000.0).await;
    Mock::given(method("POST"))
        .and(path("/v1/order"))
        .and(header_exists("orderly-signature"))
        .and(header_exists("orderly-key"))
        .and(body_partial_json(json!({
            "symbol": "PERP_ETH_USDC",
            "order_type": "LIMIT",
            "side": "BUY",
            "order_price": 1900.0,
            "reduce_only": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "order_id": 123 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let order = CreateOrder::limit(eth_perp(), Side::Long, dec!(2000), dec!(200), "USDC", dec!(1900));
    let outputs = adapter(&server, true).create_order(wallet(), &[order]).await.unwrap();
    let [RouterOutput::ApiAck { protocol, reference, .. }] = outputs.as_slice() else {
        panic!("expected one acknowledgement, got {outputs:?}");
    };
    assert_eq!(*protocol, ProtocolId::Orderly);
    assert_eq!(reference, "123");
}

#[tokio::test]
async fn order_beyond_free_collateral_is_rejected() {
    let server = MockServer::start().await;
    mount_public(&server).await;
    mount_positions(&server, 5.0).await;
    Mock::given(method("POST"))
        .and(path("/v1/order"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "order_id": 1 }
        })))
        .expect(0)
        .mount(&server)
        .await;

    let order = CreateOrder::limit(eth_perp(), Side::Long, dec!(2000), dec!(200), "USDC", dec!(1900));
    let result = adapter(&server, true).create_order(wallet(), &[order]).await;
    assert!(matches!(result, Err(AdapterError::InsufficientBalance { .. })), "{result:?}");
}

async fn mount_open_orders(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/orders"))
        .and(query_param("status", "INCOMPLETE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "rows": [{
                "order_id": 42,
                "symbol": "PERP_ETH_USDC",
                "side": "SELL",
                "type": "LIMIT",
                "price": 2500,
                "quantity": 1.5,
                "executed": 0,
                "reduce_only": true
            }]}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/algo/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "rows": [] }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn edited_reduce_only_order_keeps_its_venue_side() {
    let server = MockServer::start().await;
    mount_public(&server).await;
    mount_open_orders(&server).await;
    Mock::given(method("PUT"))
        .and(path("/v1/order"))
        .and(body_partial_json(json!({ "order_id": "42", "side": "SELL", "order_price": 2400.0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "status": "EDIT_SENT" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter(&server, true);
    let listed = adapter.get_all_orders(wallet()).await.unwrap();
    let order = &listed[0];
    assert_eq!(order.side, Side::Long);
    assert!(order.reduce_only);

    let update = UpdateOrder {
        order_id: order.order_id.clone(),
        market_id: order.market_id.clone(),
        side: order.side,
        order_type: OrderType::Limit,
        size_delta: order.size_tokens,
        size_in_usd: false,
        trigger_price: dec!(2400),
        slippage: dec!(0.01),
    };
    let outputs = adapter.update_order(wallet(), &[update]).await.unwrap();
    assert_eq!(outputs.len(), 1);
}

#[tokio::test]
async fn zero_quantity_edit_is_rejected() {
    let server = MockServer::start().await;
    mount_public(&server).await;
    mount_open_orders(&server).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": {} })))
        .expect(0)
        .mount(&server)
        .await;

    let update = UpdateOrder {
        order_id: "42".to_string(),
        market_id: eth_perp(),
        side: Side::Short,
        order_type: OrderType::Limit,
        size_delta: Decimal::ZERO,
        size_in_usd: false,
        trigger_price: dec!(2400),
        slippage: dec!(0.01),
    };
    let result = adapter(&server, true).update_order(wallet(), &[update]).await;
    assert!(matches!(result, Err(AdapterError::Validation(_))), "{result:?}");
}

#[tokio::test]
async fn algo_orders_cancel_through_the_algo_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/algo/order"))
        .and(query_param("order_id", "55"))
        .and(query_param("symbol", "PERP_ETH_USDC"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "status": "CANCEL_SENT" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cancel = CancelOrder {
        order_id: "algo:55".to_string(),
        market_id: eth_perp(),
    };
    let outputs = adapter(&server, true).cancel_order(wallet(), &[cancel]).await.unwrap();
    assert_eq!(outputs.len(), 1);
}

#[tokio::test]
async fn setup_of_new_account_returns_registration_and_key_payloads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/get_account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "code": -1,
            "message": "account not found"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/registration_nonce"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "registration_nonce": "123" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/get_orderly_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
        .mount(&server)
        .await;

    let outputs = adapter(&server, true).setup(wallet()).await.unwrap();
    let [RouterOutput::TypedData(registration), RouterOutput::TypedData(key)] = outputs.as_slice() else {
        panic!("expected two typed-data payloads, got {outputs:?}");
    };
    assert_eq!(registration.primary_type, "Registration");
    assert_eq!(registration.protocol, ProtocolId::Orderly);
    assert_eq!(key.primary_type, "AddOrderlyKey");
}
