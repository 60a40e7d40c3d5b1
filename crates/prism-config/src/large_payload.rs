use prism_core::{LargePayloadOptions, context::DEFAULT_PREFETCH_SIZE};
use serde::Deserialize;

/// Large-payload passthrough settings
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LargePayloadConfig {
    /// Response bodies above this many bytes bypass full decoding
    pub threshold: usize,
    /// Bytes read ahead to extract usage from
    #[serde(default = "default_prefetch_size")]
    pub prefetch_size: usize,
}

impl From<LargePayloadConfig> for LargePayloadOptions {
    fn from(config: LargePayloadConfig) -> Self {
        Self {
            threshold: config.threshold,
            prefetch_size: config.prefetch_size,
        }
    }
}

const fn default_prefetch_size() -> usize {
    DEFAULT_PREFETCH_SIZE
}
