//! Programmatic configuration builder for integration tests

use prism_config::{Config, LargePayloadConfig, ProviderConfig};
use prism_core::{ProviderKind, RequestKind};
use secrecy::SecretString;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Add a provider pointed at a mock upstream
    pub fn with_provider(mut self, name: &str, kind: ProviderKind, base_url: &str) -> Self {
        let mut provider = ProviderConfig::new(kind);
        provider.api_key = Some(SecretString::from("test-key"));
        provider.base_url = Some(base_url.parse().expect("valid URL"));

        self.config.providers.insert(name.to_owned(), provider);
        self
    }

    /// Restrict the last added provider to the given request kinds
    pub fn allowing(mut self, kinds: &[RequestKind]) -> Self {
        if let Some((_, provider)) = self.config.providers.last_mut() {
            provider.allowed_requests = Some(kinds.to_vec());
        }
        self
    }

    /// Add an extra header to the last added provider
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let Some((_, provider)) = self.config.providers.last_mut() {
            provider.extra_headers.insert(name.to_owned(), value.to_owned());
        }
        self
    }

    pub fn with_large_payload(mut self, threshold: usize, prefetch_size: usize) -> Self {
        self.config.large_payload = Some(LargePayloadConfig {
            threshold,
            prefetch_size,
        });
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
