use std::path::Path;

use anyhow::Context;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// expanded, the TOML is invalid, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw).context("config variable expansion failed")?;
        let config: Self = toml::from_str(&expanded).context("failed to parse config")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error when no provider is configured or a provider or the
    /// large-payload section holds unusable values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured");
        }

        for (name, provider) in &self.providers {
            if provider.stream_buffer_size == 0 {
                anyhow::bail!("provider '{name}': stream_buffer_size must be greater than 0");
            }

            if let Some(url) = &provider.base_url
                && !matches!(url.scheme(), "http" | "https")
            {
                anyhow::bail!("provider '{name}': base_url must use http or https, got '{}'", url.scheme());
            }

            for header in provider.extra_headers.keys() {
                http::HeaderName::try_from(header.as_str())
                    .with_context(|| format!("provider '{name}': invalid header name '{header}'"))?;
            }
        }

        if let Some(large) = &self.large_payload {
            if large.threshold == 0 {
                anyhow::bail!("large_payload.threshold must be greater than 0");
            }
            if large.prefetch_size == 0 {
                anyhow::bail!("large_payload.prefetch_size must be greater than 0");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use prism_core::ProviderKind;

    use crate::{Config, LogFormat};

    #[test]
    fn loads_multi_provider_config() {
        let config = temp_env::with_var("PRISM_TEST_OPENAI_KEY", Some("sk-live"), || {
            Config::from_toml(indoc! {r#"
                [telemetry]
                level = "debug"
                format = "json"

                [providers.openai]
                type = "openai"
                api_key = "{{ env.PRISM_TEST_OPENAI_KEY }}"

                [providers.local]
                type = "ollama"
                base_url = "http://localhost:11434"

                [large_payload]
                threshold = 1048576
            "#})
            .unwrap()
        });

        assert_eq!(config.telemetry.format, LogFormat::Json);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.provider("local").unwrap().provider_type, ProviderKind::Ollama);

        let large = config.large_payload.unwrap();
        assert_eq!(large.threshold, 1_048_576);
        assert_eq!(large.prefetch_size, 64 * 1024);

        insta::assert_debug_snapshot!(config.providers.keys().collect::<Vec<_>>(), @r#"
        [
            "openai",
            "local",
        ]
        "#);
    }

    #[test]
    fn empty_config_is_rejected() {
        let err = Config::from_toml("").unwrap_err();
        assert_eq!(err.to_string(), "at least one provider must be configured");
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let err = Config::from_toml(indoc! {r#"
            [providers.local]
            type = "ollama"
            stream_buffer_size = 0
        "#})
        .unwrap_err();

        assert!(err.to_string().contains("stream_buffer_size"));
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        let err = Config::from_toml(indoc! {r#"
            [providers.local]
            type = "ollama"
            base_url = "ftp://models.internal"
        "#})
        .unwrap_err();

        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn unknown_section_is_rejected() {
        let err = Config::from_toml(indoc! {r#"
            [server]
            listen = "0.0.0.0:8080"
        "#})
        .unwrap_err();

        assert!(format!("{err:#}").contains("unknown field"));
    }
}
