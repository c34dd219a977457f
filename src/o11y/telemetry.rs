use anyhow::Result;
use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    logs::{SdkLogger, SdkLoggerProvider},
    resource::Resource,
    trace::{SdkTracerProvider, Tracer},
};
use tracing::{info, warn};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::config::AppConfig;

/// Process-wide logging for a matrix run.
///
/// Case events are JSON lines on stderr, keeping stdout free for the run summary. With an
/// OTLP endpoint configured, spans and log records are also exported, tagged with the
/// environment and the base URL under test. Dropping the guard flushes both exporters.
pub struct TelemetryGuard {
    exporters: Option<Exporters>,
}

struct Exporters {
    tracer: SdkTracerProvider,
    logger: SdkLoggerProvider,
}

impl TelemetryGuard {
    pub fn init(config: &AppConfig) -> Result<Self> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.log.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let (trace_layer, log_layer, exporters) = match otlp_pipelines(config)? {
            Some(pipelines) => (
                Some(pipelines.trace_layer),
                Some(pipelines.log_layer),
                Some(pipelines.exporters),
            ),
            None => (None, None, None),
        };
        let exporting = exporters.is_some();

        tracing_subscriber::registry()
            .with(trace_layer)
            .with(log_layer)
            .with(filter)
            .with(stderr_json())
            .try_init()?;

        if exporting {
            info!(
                service = config.otel.service_name.as_str(),
                "exporting spans and logs over OTLP"
            );
        }
        Ok(Self { exporters })
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let Some(exporters) = self.exporters.take() else {
            return;
        };
        if let Err(err) = exporters.tracer.shutdown() {
            warn!(error = ?err, "span exporter did not flush cleanly");
        }
        if let Err(err) = exporters.logger.shutdown() {
            warn!(error = ?err, "log exporter did not flush cleanly");
        }
    }
}

fn stderr_json<S>() -> impl Layer<S>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
}

struct OtlpPipelines {
    trace_layer: OpenTelemetryLayer<Registry, Tracer>,
    log_layer: OpenTelemetryTracingBridge<SdkLoggerProvider, SdkLogger>,
    exporters: Exporters,
}

fn run_resource(config: &AppConfig) -> Resource {
    Resource::builder()
        .with_service_name(config.otel.service_name.clone())
        .with_attributes([
            KeyValue::new("deployment.environment.name", config.environment.clone()),
            KeyValue::new("games.target.base_url", config.target.base_url.clone()),
        ])
        .build()
}

fn otlp_pipelines(config: &AppConfig) -> Result<Option<OtlpPipelines>> {
    let Some(endpoint) = config
        .otel
        .endpoint
        .as_deref()
        .map(str::trim)
        .filter(|endpoint| !endpoint.is_empty())
    else {
        return Ok(None);
    };
    let resource = run_resource(config);

    let tracer_provider = SdkTracerProvider::builder()
        .with_resource(resource.clone())
        .with_batch_exporter(
            SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()?,
        )
        .build();
    global::set_tracer_provider(tracer_provider.clone());
    let tracer = tracer_provider.tracer(config.otel.service_name.clone());

    let logger_provider = SdkLoggerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(
            LogExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()?,
        )
        .build();

    Ok(Some(OtlpPipelines {
        trace_layer: tracing_opentelemetry::layer().with_tracer(tracer),
        log_layer: OpenTelemetryTracingBridge::new(&logger_provider),
        exporters: Exporters {
            tracer: tracer_provider,
            logger: logger_provider,
        },
    }))
}
