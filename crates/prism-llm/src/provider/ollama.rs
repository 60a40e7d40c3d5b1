//! Ollama native API endpoints

use reqwest::RequestBuilder;
use secrecy::SecretString;
use url::Url;

use crate::upstream::endpoint;

/// Default local Ollama server
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub fn chat_url(base: &Url) -> String {
    endpoint(base, "api/chat")
}

pub fn models_url(base: &Url) -> String {
    endpoint(base, "api/tags")
}

/// Local servers take no key; hosted ones behind a proxy take a bearer token
pub fn authorize(builder: RequestBuilder, key: Option<&SecretString>) -> RequestBuilder {
    super::openai::authorize(builder, key)
}
