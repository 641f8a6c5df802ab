//! Configuration for the adapter layer.
//!
//! YAML with `${VAR}` / `${VAR:-default}` interpolation, validated after
//! parsing.
//!
//! ```rust,ignore
//! use perp_adapters::config::load_config;
//!
//! let config = load_config(Some("config.yaml"))?;
//! let router = perp_adapters::build_router(&config)?;
//! ```

mod cache;
mod network;
mod observability;
mod protocols;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AdapterError;

pub use cache::{CacheConfig, CacheWindow};
pub use network::{HttpSettings, NetworkConfig};
pub use observability::{LoggingConfig, MetricsSettings, ObservabilityConfig};
pub use protocols::ProtocolsConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// EVM networks by name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    /// HTTP transport settings.
    #[serde(default)]
    pub http: HttpSettings,
    /// Cache windows.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Protocol sections.
    #[serde(default)]
    pub protocols: ProtocolsConfig,
}

impl Config {
    /// Network by name.
    pub fn network(&self, name: &str) -> Result<&NetworkConfig, AdapterError> {
        self.networks
            .get(name)
            .ok_or_else(|| AdapterError::Config(format!("network '{name}' is not configured")))
    }
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// `path` defaults to `config.yaml`.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map(|m| m.as_str());
        match cap.get(1).map(|m| std::env::var(m.as_str())) {
            Some(Ok(v)) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    for (protocol, network) in config.protocols.enabled_networks() {
        if !config.networks.contains_key(network) {
            return Err(ConfigError::ValidationError(format!(
                "protocols.{protocol}.network '{network}' is not in networks"
            )));
        }
    }

    for (name, network) in &config.networks {
        if network.rpc_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!("networks.{name}.rpc_url is empty")));
        }
    }

    for (class, window) in [
        ("markets", config.cache.markets),
        ("prices", config.cache.prices),
        ("state", config.cache.state),
    ] {
        if window.stale_ms > window.cache_ms {
            return Err(ConfigError::ValidationError(format!(
                "cache.{class}.stale_ms must not exceed cache_ms"
            )));
        }
    }

    let retry = &config.http.retry;
    if retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "http.retry.max_attempts must be at least 1".to_string(),
        ));
    }
    if retry.multiplier < 1.0 {
        return Err(ConfigError::ValidationError(
            "http.retry.multiplier must be at least 1.0".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&retry.jitter) {
        return Err(ConfigError::ValidationError(
            "http.retry.jitter must be between 0.0 and 1.0".to_string(),
        ));
    }

    if let Some(gmx) = &config.protocols.gmx_v2 {
        let slippage = gmx.default_slippage;
        if slippage <= rust_decimal::Decimal::ZERO || slippage >= rust_decimal::Decimal::ONE {
            return Err(ConfigError::ValidationError(
                "protocols.gmx_v2.default_slippage must be between 0 and 1".to_string(),
            ));
        }
    }

    if let Some(aevo) = config.protocols.aevo.as_ref().filter(|c| c.enabled) {
        if aevo.api_key.is_some() != aevo.api_secret.is_some() {
            return Err(ConfigError::ValidationError(
                "protocols.aevo.api_key and api_secret must be set together".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARBITRUM: &str = r"
networks:
  arbitrum:
    chain_id: 42161
    rpc_url: https://arb1.arbitrum.io/rpc
";

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = match load_config_from_string("{}") {
            Ok(c) => c,
            Err(e) => panic!("should load empty config: {e}"),
        };
        assert!(config.networks.is_empty());
        assert_eq!(config.http.timeout_ms, 10_000);
        assert_eq!(config.observability.logging.level, "info");
        assert_eq!(config.protocols.enabled_count(), 0);
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "rpc_url: ${PERP_ADAPTERS_TEST_NONEXISTENT_VAR:-http://localhost:8545}";
        assert_eq!(interpolate_env_vars(input), "rpc_url: http://localhost:8545");
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "api_key: ${PERP_ADAPTERS_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "api_key: ");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax, not format args
    fn test_env_var_with_default_uses_existing() {
        let result = interpolate_env_vars("path: ${PATH:-default}");
        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn test_enabled_protocol_needs_known_network() {
        let yaml = r"
protocols:
  perennial:
    enabled: true
    network: optimism
    multi_invoker: '0x1111111111111111111111111111111111111111'
    usdc: '0x2222222222222222222222222222222222222222'
";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for unknown network");
        };
        assert!(err.to_string().contains("optimism"));
    }

    #[test]
    fn test_disabled_protocol_skips_network_check() {
        let yaml = r"
protocols:
  perennial:
    enabled: false
    network: optimism
    multi_invoker: '0x1111111111111111111111111111111111111111'
    usdc: '0x2222222222222222222222222222222222222222'
";
        assert!(load_config_from_string(yaml).is_ok());
    }

    #[test]
    fn test_stale_time_beyond_cache_time_is_rejected() {
        let yaml = format!("{ARBITRUM}cache:\n  prices:\n    stale_ms: 5000\n    cache_ms: 1000\n");
        let Err(err) = load_config_from_string(&yaml) else {
            panic!("expected error for inverted cache window");
        };
        assert!(err.to_string().contains("cache.prices"));
    }

    #[test]
    fn test_retry_multiplier_below_one_is_rejected() {
        let yaml = format!("{ARBITRUM}http:\n  retry:\n    multiplier: 0.5\n");
        let Err(err) = load_config_from_string(&yaml) else {
            panic!("expected error for shrinking backoff");
        };
        assert!(err.to_string().contains("multiplier"));
    }

    #[test]
    fn test_network_lookup() {
        let config = load_config_from_string(ARBITRUM).unwrap();
        assert_eq!(config.network("arbitrum").unwrap().chain_id, 42_161);
        assert!(matches!(config.network("base"), Err(AdapterError::Config(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), ARBITRUM).unwrap();
        let config = load_config(file.path().to_str()).unwrap();
        assert!(config.networks.contains_key("arbitrum"));
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let result = load_config(Some("/nonexistent/perp-adapters.yaml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }
}
