//! Per-protocol sections. A missing section leaves the protocol out.

use serde::{Deserialize, Serialize};

use crate::infrastructure::protocols::aevo::AevoConfig;
use crate::infrastructure::protocols::gmx_v2::GmxV2Config;
use crate::infrastructure::protocols::orderly::OrderlyConfig;
use crate::infrastructure::protocols::perennial::PerennialConfig;

/// Protocol sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolsConfig {
    /// GMX v2.
    #[serde(default)]
    pub gmx_v2: Option<GmxV2Config>,
    /// Perennial v2.
    #[serde(default)]
    pub perennial: Option<PerennialConfig>,
    /// Orderly.
    #[serde(default)]
    pub orderly: Option<OrderlyConfig>,
    /// Aevo.
    #[serde(default)]
    pub aevo: Option<AevoConfig>,
}

impl ProtocolsConfig {
    /// `(protocol, network)` for every enabled on-chain or vault-backed
    /// protocol.
    #[must_use]
    pub fn enabled_networks(&self) -> Vec<(&'static str, &str)> {
        let mut networks = Vec::new();
        if let Some(c) = self.gmx_v2.as_ref().filter(|c| c.enabled) {
            networks.push(("gmx_v2", c.network.as_str()));
        }
        if let Some(c) = self.perennial.as_ref().filter(|c| c.enabled) {
            networks.push(("perennial", c.network.as_str()));
        }
        if let Some(c) = self.orderly.as_ref().filter(|c| c.enabled) {
            networks.push(("orderly", c.network.as_str()));
        }
        networks
    }

    /// Number of enabled protocols.
    #[must_use]
    pub fn enabled_count(&self) -> usize {
        self.enabled_networks().len() + usize::from(self.aevo.as_ref().is_some_and(|c| c.enabled))
    }
}
