//! Mapping upstream failures onto [`CanonicalError`]

use http::StatusCode;
use prism_core::{Attribution, CanonicalError, ErrorKind, ProviderKind};
use serde::Deserialize;
use serde_json::Value;

use crate::protocol::anthropic::AnthropicErrorResponse;
use crate::protocol::google::GoogleErrorResponse;
use crate::protocol::ollama::OllamaErrorResponse;
use crate::protocol::openai::OpenAiErrorResponse;

/// Invalid provider configuration found while building a client
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid extra header `{name}`")]
    InvalidHeader { name: String },
    #[error("provider `{name}` has a base URL with unsupported scheme `{scheme}`")]
    UnsupportedScheme { name: String, scheme: String },
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Error payload recognized in a provider body or stream line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    pub message: String,
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub param: Option<String>,
}

impl UpstreamError {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            code: None,
            param: None,
        }
    }

    /// Recognize the provider's error shape in a parsed JSON value
    ///
    /// Only counts as an error when a non-empty message was found, so a
    /// regular payload never matches.
    pub fn from_value(kind: ProviderKind, value: &Value) -> Option<Self> {
        // Gemini wraps some errors in a one-element array
        let value = match value {
            Value::Array(items) => items.first()?,
            other => other,
        };

        let typed = match kind {
            ProviderKind::OpenAi => OpenAiErrorResponse::deserialize(value).ok().map(|body| Self {
                message: body.error.message.unwrap_or_default(),
                error_type: body.error.error_type,
                code: body.error.code.and_then(scalar_string),
                param: body.error.param.and_then(scalar_string),
            }),
            ProviderKind::Anthropic => AnthropicErrorResponse::deserialize(value).ok().map(|body| Self {
                message: body.error.message.unwrap_or_default(),
                error_type: body.error.error_type,
                code: None,
                param: None,
            }),
            ProviderKind::Google => GoogleErrorResponse::deserialize(value).ok().map(|body| Self {
                message: body.error.message.unwrap_or_default(),
                error_type: body.error.status,
                code: body.error.code.map(|code| code.to_string()),
                param: None,
            }),
            ProviderKind::Ollama => OllamaErrorResponse::deserialize(value)
                .ok()
                .map(|body| Self::message(body.error)),
        };

        typed
            .filter(|error| !error.message.is_empty())
            .or_else(|| bare_error(value))
    }

    /// Attributed provider-api error, `status` is absent for mid-stream failures
    pub fn into_canonical(self, status: Option<StatusCode>, origin: Attribution) -> CanonicalError {
        let error = CanonicalError::new(ErrorKind::ProviderApi, self.message, origin)
            .with_error_type(self.error_type)
            .with_code(self.code)
            .with_param(self.param);

        match status {
            Some(status) => error.with_status(status),
            None => error,
        }
    }
}

/// `{"error": "..."}`, used by many compatible servers whatever their family
fn bare_error(value: &Value) -> Option<UpstreamError> {
    value
        .get("error")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .map(UpstreamError::message)
}

fn scalar_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Error for a non-success HTTP response
///
/// A body without a recognizable message is passed through as raw text.
pub fn api_error(kind: ProviderKind, status: StatusCode, body: &[u8], origin: Attribution) -> CanonicalError {
    let recognized = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| UpstreamError::from_value(kind, &value));

    if let Some(error) = recognized {
        return error.into_canonical(Some(status), origin);
    }

    let text = String::from_utf8_lossy(body).trim().to_owned();
    let message = if text.is_empty() {
        status.canonical_reason().unwrap_or("upstream error").to_owned()
    } else {
        text
    };

    CanonicalError::provider_api(status, message, origin)
}

/// Error for a failed send or body read
pub fn transport_error(error: &reqwest::Error, origin: Attribution) -> CanonicalError {
    if error.is_timeout() {
        return CanonicalError::timeout(origin);
    }
    if error.is_decode() {
        return CanonicalError::decode(error.to_string(), origin);
    }
    CanonicalError::network(error.to_string(), origin)
}

/// Error for a success body that did not match the expected shape
pub fn decode_error(error: &serde_json::Error, origin: Attribution) -> CanonicalError {
    CanonicalError::decode(format!("failed to parse response: {error}"), origin)
}
