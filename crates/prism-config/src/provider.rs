use std::time::Duration;

use duration_str::deserialize_duration;
use indexmap::IndexMap;
use prism_core::{ProviderKind, RequestKind};
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Configuration for a single upstream provider
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Wire protocol spoken by the upstream
    #[serde(rename = "type")]
    pub provider_type: ProviderKind,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Per-request deadline (e.g. "30s", "2m")
    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Capacity of the bounded channel between the stream worker and the caller
    #[serde(default = "default_stream_buffer_size")]
    pub stream_buffer_size: usize,
    /// Attach upstream JSON text to every response and stream event
    #[serde(default)]
    pub send_back_raw_response: bool,
    /// Headers sent with every upstream request
    #[serde(default)]
    pub extra_headers: IndexMap<String, String>,
    /// Request kinds this provider may serve, all when absent
    #[serde(default)]
    pub allowed_requests: Option<Vec<RequestKind>>,
}

impl ProviderConfig {
    /// Minimal configuration for a provider type, mostly useful in tests
    pub fn new(provider_type: ProviderKind) -> Self {
        Self {
            provider_type,
            api_key: None,
            base_url: None,
            timeout: default_timeout(),
            stream_buffer_size: default_stream_buffer_size(),
            send_back_raw_response: false,
            extra_headers: IndexMap::new(),
            allowed_requests: None,
        }
    }

    /// Whether this provider may serve `kind`
    pub fn allows(&self, kind: RequestKind) -> bool {
        self.allowed_requests
            .as_ref()
            .is_none_or(|allowed| allowed.contains(&kind))
    }
}

const fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

const fn default_stream_buffer_size() -> usize {
    64
}
