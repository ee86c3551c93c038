//! Tracing bootstrap with optional OpenTelemetry export.
//!
//! Log lines always go to stdout, as text or JSON. When telemetry is enabled,
//! spans are also exported over OTLP/gRPC.

use crate::config::{LoggingSettings, TelemetrySettings};
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider},
};
use tracing_subscriber::{Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// OpenTelemetry tracer guard
///
/// When dropped, flushes all pending spans and shuts down the tracer
pub struct TelemetryGuard;

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

/// Build the OTLP tracer provider.
///
/// Returns `None` when telemetry is disabled.
pub fn init_telemetry(settings: &TelemetrySettings) -> anyhow::Result<Option<TracerProvider>> {
    if !settings.enabled {
        return Ok(None);
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(settings.otlp_endpoint.as_str())
        .build()?;

    let resource = Resource::new(vec![
        KeyValue::new("service.name", settings.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    Ok(Some(provider))
}

/// Set up the global subscriber from the logging and telemetry settings.
///
/// `RUST_LOG` overrides the configured level.
pub fn setup_tracing(
    logging: &LoggingSettings,
    telemetry: &TelemetrySettings,
) -> anyhow::Result<Option<TelemetryGuard>> {
    let level = logging.level.as_deref().unwrap_or("info");
    let json = logging.format.as_deref() == Some("json");

    let Some(provider) = init_telemetry(telemetry)? else {
        if json {
            common::logging::init_json(level);
        } else {
            common::logging::init(level);
        }
        tracing::info!("Tracing initialized without OpenTelemetry");
        return Ok(None);
    };

    let fmt_layer = if json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };
    let telemetry_layer =
        tracing_opentelemetry::layer().with_tracer(provider.tracer("selfcheck-server"));
    opentelemetry::global::set_tracer_provider(provider);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(telemetry_layer)
        .with(common::logging::env_filter(level))
        .init();

    tracing::info!(
        service_name = %telemetry.service_name,
        otlp_endpoint = %telemetry.otlp_endpoint,
        "Tracing initialized with OpenTelemetry integration"
    );

    Ok(Some(TelemetryGuard))
}
