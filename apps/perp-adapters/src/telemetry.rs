//! Tracing Setup
//!
//! Console logging plus an optional OTLP span exporter. Settings come from
//! [`LoggingConfig`]; `RUST_LOG` replaces the configured filter and the
//! standard `OTEL_*` variables replace the export settings.
//! `APP_ENV=development` switches to colored output without targets.

use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Shuts the tracer provider down on drop, flushing pending spans.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Error shutting down tracer provider: {e:?}");
            }
        }
    }
}

/// Export settings after environment overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExportSettings {
    enabled: bool,
    endpoint: String,
    service_name: String,
}

impl ExportSettings {
    fn resolve(logging: &LoggingConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            enabled: env("OTEL_ENABLED").map_or(logging.otlp_enabled, |v| v != "false"),
            endpoint: env("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|| logging.otlp_endpoint.clone()),
            service_name: env("OTEL_SERVICE_NAME").unwrap_or_else(|| logging.service_name.clone()),
        }
    }
}

fn build_provider(settings: &ExportSettings) -> Option<SdkTracerProvider> {
    match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&settings.endpoint)
        .build()
    {
        Ok(exporter) => Some(SdkTracerProvider::builder().with_simple_exporter(exporter).build()),
        Err(e) => {
            eprintln!("Failed to create OTLP exporter: {e:?}, falling back to console logging");
            None
        }
    }
}

/// Install the global subscriber.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
#[must_use]
pub fn init_telemetry(logging: &LoggingConfig) -> TelemetryGuard {
    let settings = ExportSettings::resolve(logging, |name| std::env::var(name).ok());
    let is_development = std::env::var("APP_ENV").is_ok_and(|v| v == "development");
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let console = tracing_subscriber::fmt::layer()
        .with_target(!is_development)
        .with_ansi(is_development);

    let provider = if settings.enabled { build_provider(&settings) } else { None };
    let Some(provider) = provider else {
        Registry::default().with(env_filter).with(console).init();
        tracing::info!(otlp = settings.enabled, "Console logging initialized");
        return TelemetryGuard { provider: None };
    };

    let tracer = provider.tracer(settings.service_name.clone());
    Registry::default()
        .with(env_filter)
        .with(console)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .init();

    tracing::info!(
        service_name = %settings.service_name,
        endpoint = %settings.endpoint,
        "OpenTelemetry initialized"
    );
    TelemetryGuard {
        provider: Some(provider),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_applies_without_overrides() {
        let logging = LoggingConfig {
            otlp_enabled: false,
            ..LoggingConfig::default()
        };
        let settings = ExportSettings::resolve(&logging, |_| None);
        assert!(!settings.enabled);
        assert_eq!(settings.endpoint, "http://localhost:4317");
        assert_eq!(settings.service_name, "perp-adapters");
    }

    #[test]
    fn environment_overrides_config() {
        let settings = ExportSettings::resolve(&LoggingConfig::default(), |name| match name {
            "OTEL_ENABLED" => Some("false".to_string()),
            "OTEL_SERVICE_NAME" => Some("adapters-staging".to_string()),
            _ => None,
        });
        assert!(!settings.enabled);
        assert_eq!(settings.service_name, "adapters-staging");
    }
}
