//! Observability module for metrics.
//!
//! Tracing setup lives in [`crate::telemetry`].

mod metrics;

pub use self::metrics::{
    MetricsConfig, MetricsError, init_metrics, record_adapter_call, record_cache_lookup,
    record_http_retry,
};
