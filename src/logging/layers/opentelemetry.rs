use crate::logging::config::OpenTelemetryConfig;
use crate::logging::layers::BoxLayer;
use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{resource::Resource, trace::SdkTracerProvider};
use tracing_subscriber::registry::Registry;
use tracing_subscriber::Layer;
use url::Url;

/// Flushes and shuts the tracer provider down on drop.
pub struct OpenTelemetryGuard(SdkTracerProvider);

impl Drop for OpenTelemetryGuard {
    fn drop(&mut self) {
        if let Err(err) = self.0.force_flush() {
            eprintln!("failed to flush OpenTelemetry spans: {}", err);
        }
        let _ = self.0.shutdown();
    }
}

/// OTLP export target resolved from `[logging.opentelemetry]`.
#[derive(Debug, Clone, PartialEq)]
pub struct OtlpExport {
    pub endpoint: Url,
    pub service_name: String,
}

impl OtlpExport {
    /// `None` when export is disabled or no endpoint is configured.
    pub fn from_config(config: &OpenTelemetryConfig) -> Result<Option<Self>> {
        let endpoint = match (config.enabled, config.endpoint.as_deref()) {
            (true, Some(endpoint)) => endpoint,
            _ => return Ok(None),
        };
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("invalid OTLP endpoint '{}'", endpoint))?;
        Ok(Some(OtlpExport {
            endpoint,
            service_name: config.service_name.clone(),
        }))
    }

    /// Build the tracing layer exporting spans over gRPC.
    pub fn install(&self) -> Result<(BoxLayer<Registry>, OpenTelemetryGuard)> {
        let exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(self.endpoint.as_str())
            .build()
            .with_context(|| format!("failed to build OTLP exporter for {}", self.endpoint))?;

        let resource = Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attribute(KeyValue::new("service.version", crate::VERSION))
            .build();
        let provider = SdkTracerProvider::builder()
            .with_resource(resource)
            .with_batch_exporter(exporter)
            .build();

        let layer = tracing_opentelemetry::layer()
            .with_tracer(provider.tracer("flowlens"))
            .boxed();
        Ok((layer, OpenTelemetryGuard(provider)))
    }
}
