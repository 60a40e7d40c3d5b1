use std::fmt;

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::kind::RequestKind;

/// Failure category shared by every provider and request kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Transport failure before a response body was obtained
    Network,
    /// Body could not be decoded as the expected shape
    Decode,
    /// Upstream answered with a well-formed error payload
    ProviderApi,
    /// The caller or its context gave up on the request
    Cancelled,
    /// The request deadline elapsed
    Timeout,
    /// The provider has no equivalent of the requested operation
    UnsupportedOperation,
    /// The request kind is blocked by configuration
    OperationDisallowed,
    /// Nothing usable was supplied to convert
    InvalidRequest,
}

impl ErrorKind {
    /// Whether retrying the same request could plausibly succeed
    pub const fn is_retryable(self, status: Option<StatusCode>) -> bool {
        match self {
            Self::Network | Self::Timeout => true,
            Self::ProviderApi => match status {
                Some(status) => matches!(status.as_u16(), 429 | 500..=599),
                None => false,
            },
            Self::Decode
            | Self::Cancelled
            | Self::UnsupportedOperation
            | Self::OperationDisallowed
            | Self::InvalidRequest => false,
        }
    }
}

/// Who the failing request was for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribution {
    /// Configured provider name
    pub provider: String,
    /// Model the caller asked for
    pub model: String,
    pub request_kind: RequestKind,
}

impl Attribution {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, request_kind: RequestKind) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            request_kind,
        }
    }
}

impl fmt::Display for Attribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.provider, self.model, self.request_kind)
    }
}

/// Normalized error returned from every provider operation
///
/// Always carries the attribution triple so the caller never has to work out
/// which request failed.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{kind} error from {origin}: {message}")]
pub struct CanonicalError {
    pub kind: ErrorKind,
    pub message: String,
    /// Provider error code, when the body had one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Offending request parameter, when the body named one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    /// Provider error type string (e.g. `invalid_request_error`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Upstream HTTP status for provider-api failures
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_status")]
    pub status: Option<StatusCode>,
    pub origin: Attribution,
}

#[allow(clippy::ref_option, clippy::trivially_copy_pass_by_ref)]
fn serialize_status<S: serde::Serializer>(status: &Option<StatusCode>, serializer: S) -> Result<S::Ok, S::Error> {
    match status {
        Some(status) => serializer.serialize_u16(status.as_u16()),
        None => serializer.serialize_none(),
    }
}

impl CanonicalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, origin: Attribution) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            param: None,
            error_type: None,
            status: None,
            origin,
        }
    }

    pub fn network(message: impl Into<String>, origin: Attribution) -> Self {
        Self::new(ErrorKind::Network, message, origin)
    }

    pub fn decode(message: impl Into<String>, origin: Attribution) -> Self {
        Self::new(ErrorKind::Decode, message, origin)
    }

    pub fn cancelled(origin: Attribution) -> Self {
        Self::new(ErrorKind::Cancelled, "request was cancelled", origin)
    }

    pub fn timeout(origin: Attribution) -> Self {
        Self::new(ErrorKind::Timeout, "request timed out", origin)
    }

    /// The provider cannot perform this kind of request at all
    pub fn unsupported(origin: Attribution) -> Self {
        let message = format!("{} is not supported by provider {}", origin.request_kind, origin.provider);
        Self::new(ErrorKind::UnsupportedOperation, message, origin)
    }

    pub fn disallowed(origin: Attribution) -> Self {
        let message = format!("{} is not allowed for provider {}", origin.request_kind, origin.provider);
        Self::new(ErrorKind::OperationDisallowed, message, origin)
    }

    /// Upstream error response with its HTTP status attached
    pub fn provider_api(status: StatusCode, message: impl Into<String>, origin: Attribution) -> Self {
        Self::new(ErrorKind::ProviderApi, message, origin).with_status(status)
    }

    #[must_use]
    pub const fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.code = code;
        self
    }

    #[must_use]
    pub fn with_param(mut self, param: Option<String>) -> Self {
        self.param = param;
        self
    }

    #[must_use]
    pub fn with_error_type(mut self, error_type: Option<String>) -> Self {
        self.error_type = error_type;
        self
    }

    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable(self.status)
    }
}
