//! Perp Adapters Binary
//!
//! Smoke run over the configured venues: builds the router, lists markets
//! per protocol and, when a wallet is given, its positions and orders.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin perp-adapters
//! ```
//!
//! # Environment Variables
//!
//! - `PERP_ADAPTERS_CONFIG`: config path (default: `config.yaml`)
//! - `WALLET_ADDRESS`: wallet to inspect (optional)
//! - `RUST_LOG`: log filter (default: the configured level)

use alloy_primitives::Address;
use anyhow::Context;
use perp_adapters::config::load_config;
use perp_adapters::observability::init_metrics;
use perp_adapters::telemetry::init_telemetry;
use perp_adapters::{AdapterRouter, Aggregated, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let path = std::env::var("PERP_ADAPTERS_CONFIG").ok();
    let config = load_config(path.as_deref()).context("loading configuration")?;
    let _guard = init_telemetry(&config.observability.logging);

    if config.observability.metrics.enabled {
        init_metrics(&config.observability.metrics.exporter_config())?;
    }

    tracing::info!(
        protocols = config.protocols.enabled_count(),
        networks = config.networks.len(),
        "Starting perp adapters"
    );

    let router = build_router(&config).context("building adapter router")?;

    let markets = router.get_all_markets(None).await;
    for protocol in router.protocols() {
        let count = markets.items.iter().filter(|m| m.protocol == protocol).count();
        tracing::info!(%protocol, markets = count, "Markets loaded");
    }
    log_failures("get_all_markets", &markets);

    if let Ok(wallet) = std::env::var("WALLET_ADDRESS") {
        let wallet: Address = wallet.parse().context("WALLET_ADDRESS is not an address")?;
        inspect_wallet(&router, wallet).await;
    }

    Ok(())
}

async fn inspect_wallet(router: &AdapterRouter, wallet: Address) {
    let (positions, orders) = tokio::join!(
        router.get_all_positions(wallet, None),
        router.get_all_orders(wallet, None)
    );

    for position in &positions.items {
        tracing::info!(
            market = %position.market_id,
            side = %position.side,
            size_usd = %position.size_usd,
            leverage = %position.leverage.round_dp(2),
            pnl = %position.unrealized_pnl.round_dp(2),
            "Position"
        );
    }
    for order in &orders.items {
        tracing::info!(
            market = %order.market_id,
            order_id = %order.order_id,
            order_type = ?order.order_type,
            size_usd = %order.size_usd,
            "Order"
        );
    }
    log_failures("get_all_positions", &positions);
    log_failures("get_all_orders", &orders);
}

fn log_failures<T>(operation: &str, result: &Aggregated<T>) {
    for failure in &result.failures {
        tracing::warn!(operation, protocol = %failure.protocol, error = %failure.error, "Protocol failed");
    }
}

/// Load `.env` from the working directory or the nearest ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}
