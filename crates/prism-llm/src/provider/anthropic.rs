//! Anthropic Messages API endpoints

use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::upstream::endpoint;

/// Default Anthropic API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub fn chat_url(base: &Url) -> String {
    endpoint(base, "messages")
}

pub fn models_url(base: &Url) -> String {
    endpoint(base, "models")
}

pub fn authorize(builder: RequestBuilder, key: Option<&SecretString>) -> RequestBuilder {
    let builder = builder.header("anthropic-version", ANTHROPIC_VERSION);
    match key {
        Some(key) => builder.header("x-api-key", key.expose_secret()),
        None => builder,
    }
}
