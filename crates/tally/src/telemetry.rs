use std::io::IsTerminal;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace as sdktrace;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Quiet logging for one-shot commands whose stdout is the product.
pub fn init_cli_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .compact()
        .try_init();
}

/// Agent logging: stderr plus OTLP span export when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set. Spans carry a `tally` service
/// resource.
pub fn init_run_tracing() -> TracingGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .compact();

    let provider = build_otlp_provider();
    let otlp_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("tally-agent")));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otlp_layer)
        .try_init();

    TracingGuard { provider }
}

/// Flushes buffered spans when dropped or shut down explicitly.
pub struct TracingGuard {
    provider: Option<sdktrace::SdkTracerProvider>,
}

impl TracingGuard {
    pub fn shutdown(mut self) {
        self.flush();
    }

    fn flush(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("tally: failed to flush spans: {e}");
        }
    }
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        self.flush();
    }
}

fn agent_resource() -> Resource {
    Resource::builder()
        .with_service_name("tally")
        .with_attributes([
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("process.pid", i64::from(std::process::id())),
        ])
        .build()
}

fn build_otlp_provider() -> Option<sdktrace::SdkTracerProvider> {
    std::env::var_os("OTEL_EXPORTER_OTLP_ENDPOINT")?;

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("tally: span export disabled: {e}");
            return None;
        }
    };

    Some(
        sdktrace::SdkTracerProvider::builder()
            .with_resource(agent_resource())
            .with_batch_exporter(exporter)
            .build(),
    )
}
