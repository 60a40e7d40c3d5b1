//! Logging setup for Prism
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and a single
//! `fmt` layer in either text or JSON form.

use prism_config::{LogFormat, TelemetryConfig};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Held for the lifetime of the process
#[derive(Debug)]
#[must_use = "dropping the guard ends telemetry for the process"]
pub struct TelemetryGuard {
    format: LogFormat,
}

impl TelemetryGuard {
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

/// Initialize logging from configuration
///
/// `RUST_LOG` wins over the configured level, which wins over `default_filter`.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a global
/// subscriber was already installed
pub fn init(config: &TelemetryConfig, default_filter: &str) -> anyhow::Result<TelemetryGuard> {
    let filter = build_filter(config, default_filter)?;

    let fmt_layer = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(TelemetryGuard { format: config.format })
}

fn build_filter(config: &TelemetryConfig, default_filter: &str) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directive = config.level.as_deref().unwrap_or(default_filter);
    EnvFilter::try_new(directive).map_err(|e| anyhow::anyhow!("invalid log filter '{directive}': {e}"))
}
