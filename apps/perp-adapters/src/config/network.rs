//! Chain endpoints and HTTP transport settings.

use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::domain::Chain;
use crate::infrastructure::evm::MULTICALL3_ADDRESS;
use crate::infrastructure::http::{HttpClientConfig, RetryConfig};

/// One EVM network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Chain id.
    pub chain_id: u64,
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Multicall3 deployment.
    #[serde(default = "default_multicall")]
    pub multicall: Address,
}

impl NetworkConfig {
    /// Chain of this network.
    #[must_use]
    pub const fn chain(&self) -> Chain {
        Chain::new(self.chain_id)
    }

    /// Transport config for the RPC endpoint.
    #[must_use]
    pub fn rpc_client_config(&self, http: &HttpSettings) -> HttpClientConfig {
        http.client_config(&self.rpc_url)
    }
}

const fn default_multicall() -> Address {
    MULTICALL3_ADDRESS
}

/// HTTP transport settings shared by REST venues and RPC endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl HttpSettings {
    /// Transport config for `base_url`.
    #[must_use]
    pub fn client_config(&self, base_url: &str) -> HttpClientConfig {
        HttpClientConfig::new(base_url)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_retry(self.retry.clone())
    }
}

const fn default_timeout_ms() -> u64 {
    10_000
}
