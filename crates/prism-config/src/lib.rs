#![allow(clippy::must_use_candidate)]

mod env;
pub mod large_payload;
mod loader;
pub mod provider;
pub mod telemetry;

use indexmap::IndexMap;
use serde::Deserialize;

pub use env::ExpandError;
pub use large_payload::LargePayloadConfig;
pub use provider::ProviderConfig;
pub use telemetry::{LogFormat, TelemetryConfig};

/// Top-level Prism configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Upstream providers keyed by the name callers address them with
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    /// Passthrough mode for oversized response bodies
    #[serde(default)]
    pub large_payload: Option<LargePayloadConfig>,
}

impl Config {
    /// Look up a provider by its configured name
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }
}
