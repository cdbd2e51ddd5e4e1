//! Tracing subscriber setup with optional OTLP span export.
//!
//! Logs always go to stdout through the fmt layer. When
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans are additionally exported over
//! OTLP/gRPC so request traces land next to the rest of the platform's
//! telemetry.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    trace::{SdkTracerProvider, Tracer},
    Resource,
};
use std::env::var;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

fn otlp_endpoint() -> Option<String> {
    var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .map(|endpoint| {
            if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint
            } else {
                format!("https://{}", endpoint.trim_end_matches('/'))
            }
        })
        .filter(|endpoint| !endpoint.is_empty())
}

fn init_tracer(endpoint: String) -> Result<Tracer> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("failed to build OTLP span exporter")?;

    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    global::set_text_map_propagator(TraceContextPropagator::new());

    let tracer = provider.tracer(env!("CARGO_PKG_NAME"));
    let _ = TRACER_PROVIDER.set(provider);

    Ok(tracer)
}

/// Initialize the global tracing subscriber.
///
/// Verbosity from the CLI wins; otherwise `RUST_LOG` applies; otherwise only
/// errors are logged.
///
/// # Errors
/// Returns an error if a subscriber is already installed or the OTLP exporter
/// cannot be built.
pub fn init(level: Option<Level>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")),
    };

    let fmt_layer = fmt::layer().with_target(false);

    let subscriber = Registry::default().with(filter).with(fmt_layer);

    match otlp_endpoint() {
        Some(endpoint) => {
            let tracer = init_tracer(endpoint)?;
            let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
            tracing::subscriber::set_global_default(subscriber.with(otel_layer))
                .context("failed to set global tracing subscriber")
        }
        None => tracing::subscriber::set_global_default(subscriber)
            .context("failed to set global tracing subscriber"),
    }
}
