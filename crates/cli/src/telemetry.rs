//! Observability wiring.
//!
//! Every crate in the workspace emits `tracing` spans and events; this module
//! installs the one subscriber they flow into:
//!
//! - an [`EnvFilter`] (`RUST_LOG` wins; otherwise `info`, with workspace
//!   crates raised to `debug` when the `debug_mode` setting is on),
//! - a text or JSON formatting layer on stderr,
//! - an OpenTelemetry OTLP exporter when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

use anyhow::Context;
use clap::ValueEnum;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const SERVICE_NAME: &str = "taskdigest";

/// Environment variable that switches the OTLP exporter on.
pub const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

const WORKSPACE_TARGETS: &[&str] = &[
    "taskdigest",
    "pipeline",
    "orchestrator",
    "bugherd",
    "llm",
    "store",
    "listener",
];

/// Output format of the console layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Keeps the exporter alive; flushes pending spans when shut down.
#[must_use]
#[derive(Debug, Default)]
pub struct TelemetryGuard {
    provider: Option<TracerProvider>,
}

impl TelemetryGuard {
    /// Flushes and stops the exporter, if one was installed.
    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            if let Err(error) = provider.shutdown() {
                eprintln!("Failed to flush telemetry: {error}");
            }
        }
    }
}

/// The filter used when `RUST_LOG` is unset.
pub fn default_directives(debug_mode: bool) -> String {
    if !debug_mode {
        return "info".to_string();
    }
    std::iter::once("info".to_string())
        .chain(WORKSPACE_TARGETS.iter().map(|target| format!("{target}=debug")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs the global subscriber.
pub fn init(format: LogFormat, debug_mode: bool) -> anyhow::Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(debug_mode)))
        .context("invalid log filter")?;

    let console = match format {
        LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };

    let provider = match std::env::var(OTLP_ENDPOINT_VAR) {
        Ok(endpoint) if !endpoint.trim().is_empty() => Some(otlp_provider()?),
        _ => None,
    };
    let otel = provider
        .as_ref()
        .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME)));

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(otel)
        .try_init()
        .context("failed to install tracing subscriber")?;

    if let Some(provider) = &provider {
        opentelemetry::global::set_tracer_provider(provider.clone());
    }

    Ok(TelemetryGuard { provider })
}

fn otlp_provider() -> anyhow::Result<TracerProvider> {
    // Endpoint and headers are read from the standard OTEL_* variables.
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .context("failed to build OTLP span exporter")?;

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            SERVICE_NAME,
        )]))
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_respect_debug_mode() {
        assert_eq!(default_directives(false), "info");

        let verbose = default_directives(true);
        assert!(verbose.starts_with("info,"));
        assert!(verbose.contains("orchestrator=debug"));
        assert!(verbose.contains("taskdigest=debug"));
        assert!(EnvFilter::try_new(verbose).is_ok());
    }
}
