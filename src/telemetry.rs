use anyhow::{Context, Result};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, Resource};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Telemetry configuration structure
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub otlp_endpoint: Option<String>,
    pub enable_tracing: bool,
    pub export_timeout: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: std::env::var("DEPLOYMENT_ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            enable_tracing: std::env::var("OTEL_TRACES_ENABLED")
                .map(|v| v.parse().unwrap_or(true))
                .unwrap_or(true),
            export_timeout: Duration::from_secs(30),
        }
    }
}

/// Telemetry handles for graceful shutdown
pub struct TelemetryHandles {
    _config: TelemetryConfig,
}

impl TelemetryHandles {
    /// Gracefully shutdown all telemetry providers
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down telemetry providers...");

        global::shutdown_tracer_provider();

        info!("Telemetry providers shutdown completed");
        Ok(())
    }
}

/// Initialize tracing and OTLP export for the service
pub async fn init_telemetry(config: Option<TelemetryConfig>) -> Result<TelemetryHandles> {
    let config = config.unwrap_or_default();

    let resource = create_resource(&config)?;

    if config.enable_tracing {
        init_tracing(&config, &resource).await?;
    }

    setup_tracing_subscriber(&config)?;

    info!(
        "Telemetry initialized for service: {} v{} in environment: {}",
        config.service_name, config.service_version, config.environment
    );
    Ok(TelemetryHandles { _config: config })
}

/// Create resource with service metadata
fn create_resource(config: &TelemetryConfig) -> Result<Resource> {
    let resource = Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", config.service_version.clone()),
        KeyValue::new("deployment.environment", config.environment.clone()),
    ]);

    Ok(resource)
}

/// Initialize distributed tracing
async fn init_tracing(config: &TelemetryConfig, resource: &Resource) -> Result<()> {
    if let Some(endpoint) = &config.otlp_endpoint {
        opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint)
                    .with_timeout(config.export_timeout),
            )
            .with_trace_config(
                opentelemetry_sdk::trace::config()
                    .with_resource(resource.clone())
                    .with_sampler(opentelemetry_sdk::trace::Sampler::AlwaysOn),
            )
            .install_batch(runtime::Tokio)
            .context("Failed to initialize OTLP tracer")?;

        info!("Distributed tracing initialized with OTLP exporter");
    } else {
        // For development, just use console logging - tracing will handle the output
        info!("No OTLP endpoint configured, using console-only tracing");
    }

    Ok(())
}

/// Set up tracing subscriber
fn setup_tracing_subscriber(_config: &TelemetryConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into());

    Registry::default()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}

/// Get a meter instance for the current service (log-backed until a real
/// metrics exporter is wired in)
pub fn get_meter(name: &str) -> LogMeter {
    LogMeter {
        name: name.to_string(),
    }
}

#[derive(Debug)]
pub struct LogMeter {
    name: String,
}

impl LogMeter {
    pub fn u64_counter(&self, name: &str) -> LogCounter {
        LogCounter {
            name: format!("{}.{}", self.name, name),
        }
    }

    pub fn f64_histogram(&self, name: &str) -> LogHistogram {
        LogHistogram {
            name: format!("{}.{}", self.name, name),
        }
    }
}

#[derive(Debug)]
pub struct LogCounter {
    name: String,
}

impl LogCounter {
    pub fn add(&self, value: u64, _attributes: &[KeyValue]) {
        tracing::debug!(counter = %self.name, value, "Counter incremented");
    }
}

#[derive(Debug)]
pub struct LogHistogram {
    name: String,
}

impl LogHistogram {
    pub fn record(&self, value: f64, _attributes: &[KeyValue]) {
        tracing::debug!(histogram = %self.name, value, "Histogram recorded");
    }
}

/// Health check for telemetry components
pub fn telemetry_health_check() -> HashMap<String, bool> {
    let mut health = HashMap::new();

    health.insert("tracer_provider".to_string(), true);
    health.insert("meter_provider".to_string(), true);

    health
}
