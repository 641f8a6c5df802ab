//! Prometheus metrics for adapter calls, HTTP retries and caches.
//!
//! # Example
//!
//! ```ignore
//! use perp_adapters::observability::{init_metrics, MetricsConfig};
//!
//! init_metrics(&MetricsConfig::default())?;
//! record_adapter_call("GMXV2", "get_all_markets", "ok", 0.120);
//! ```

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for latency measurements (in seconds).
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090)),
            // Venue round trips: 5ms to 10s
            latency_buckets: vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        }
    }
}

impl MetricsConfig {
    /// Create a new metrics configuration with custom address.
    #[must_use]
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: addr,
            ..Default::default()
        }
    }
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Initialize the Prometheus metrics exporter.
///
/// Starts an HTTP listener that exposes metrics at `/metrics`.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.latency_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(addr = %config.listen_addr, "Prometheus metrics exporter started");

    Ok(())
}

/// Record one adapter operation.
///
/// * `protocol` - Venue (e.g. "GMXV2", "ORDERLY")
/// * `operation` - Port operation (e.g. "create_order")
/// * `status` - "ok" or an error reason
/// * `latency_seconds` - Wall time of the call
pub fn record_adapter_call(protocol: &str, operation: &str, status: &str, latency_seconds: f64) {
    counter!(
        "adapter_calls_total",
        "protocol" => protocol.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        "adapter_call_latency_seconds",
        "protocol" => protocol.to_string(),
        "operation" => operation.to_string()
    )
    .record(latency_seconds);
}

/// Record a retried HTTP / RPC request.
pub fn record_http_retry(host: &str, reason: &str) {
    counter!(
        "http_retries_total",
        "host" => host.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a cache lookup outcome ("hit", "miss", "stale").
pub fn record_cache_lookup(cache: &str, outcome: &str) {
    counter!(
        "cache_lookups_total",
        "cache" => cache.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_listens_on_9090() {
        let config = MetricsConfig::default();
        assert_eq!(config.listen_addr.port(), 9090);
        assert!(config.latency_buckets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn config_with_addr() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(MetricsConfig::with_addr(addr).listen_addr.port(), 8080);
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_adapter_call("GMXV2", "get_all_markets", "ok", 0.1);
        record_http_retry("api.aevo.xyz", "429");
        record_cache_lookup("gmx_v2.markets", "hit");
    }
}
