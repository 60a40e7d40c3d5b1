//! OpenAI-compatible endpoints

use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::upstream::endpoint;

/// Default `OpenAI` API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub fn chat_url(base: &Url) -> String {
    endpoint(base, "chat/completions")
}

pub fn models_url(base: &Url) -> String {
    endpoint(base, "models")
}

/// Bearer token; compatible servers without auth get no header
pub fn authorize(builder: RequestBuilder, key: Option<&SecretString>) -> RequestBuilder {
    match key {
        Some(key) => builder.bearer_auth(key.expose_secret()),
        None => builder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_on_base() {
        let base = Url::parse("http://localhost:8000/v1/").unwrap();
        assert_eq!(chat_url(&base), "http://localhost:8000/v1/chat/completions");
    }
}
