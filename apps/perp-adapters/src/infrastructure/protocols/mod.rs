//! Venue adapters and router assembly.

pub mod aevo;
pub mod common;
pub mod gmx_v2;
pub mod orderly;
pub mod perennial;

use std::sync::Arc;

use crate::application::{AdapterResult, AdapterRouter};
use crate::config::Config;

pub use aevo::AevoAdapter;
pub use gmx_v2::GmxV2Adapter;
pub use orderly::OrderlyAdapter;
pub use perennial::PerennialAdapter;

/// Build a router holding one adapter per enabled protocol.
pub fn build_router(config: &Config) -> AdapterResult<AdapterRouter> {
    let mut router = AdapterRouter::new();
    let protocols = &config.protocols;

    if let Some(gmx) = protocols.gmx_v2.as_ref().filter(|c| c.enabled) {
        let network = config.network(&gmx.network)?;
        router.register(Arc::new(GmxV2Adapter::new(gmx.clone(), network, &config.http, &config.cache)?));
    }
    if let Some(perennial) = protocols.perennial.as_ref().filter(|c| c.enabled) {
        let network = config.network(&perennial.network)?;
        router.register(Arc::new(PerennialAdapter::new(
            perennial.clone(),
            network,
            &config.http,
            &config.cache,
        )?));
    }
    if let Some(orderly) = protocols.orderly.as_ref().filter(|c| c.enabled) {
        let network = config.network(&orderly.network)?;
        router.register(Arc::new(OrderlyAdapter::new(
            orderly.clone(),
            network,
            &config.http,
            &config.cache,
        )?));
    }
    if let Some(aevo) = protocols.aevo.as_ref().filter(|c| c.enabled) {
        router.register(Arc::new(AevoAdapter::new(aevo.clone(), &config.http, &config.cache)?));
    }

    tracing::info!(protocols = ?router.protocols(), "Adapter router ready");
    Ok(router)
}
