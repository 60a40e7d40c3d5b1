//! Google Generative Language API endpoints

use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::upstream::endpoint;

/// Default Google Generative Language API base URL
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// `generateContent`, or its SSE streaming variant
pub fn chat_url(base: &Url, model: &str, stream: bool) -> String {
    let model = model.strip_prefix("models/").unwrap_or(model);
    if stream {
        endpoint(base, &format!("models/{model}:streamGenerateContent?alt=sse"))
    } else {
        endpoint(base, &format!("models/{model}:generateContent"))
    }
}

pub fn models_url(base: &Url) -> String {
    endpoint(base, "models")
}

/// The key travels as the `key` query parameter
pub fn authorize(builder: RequestBuilder, key: Option<&SecretString>) -> RequestBuilder {
    match key {
        Some(key) => builder.query(&[("key", key.expose_secret())]),
        None => builder,
    }
}
