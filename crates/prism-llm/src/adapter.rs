//! Closed set of provider protocol adapters
//!
//! Each variant bundles the request, response and stream converters of one
//! wire family. A new provider family is a new variant here.

use prism_core::ProviderKind;
use serde::Serialize;
use serde_json::Value;

use crate::convert::{anthropic, google, ollama, openai};
use crate::error::UpstreamError;
use crate::protocol::anthropic::{AnthropicModelList, AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};
use crate::protocol::google::{GoogleModelList, GoogleRequest, GoogleResponse};
use crate::protocol::ollama::{OllamaChatRequest, OllamaChatResponse, OllamaTags};
use crate::protocol::openai::{OpenAiModelList, OpenAiRequest, OpenAiResponse, OpenAiStreamChunk};
use crate::stream::ChunkUpdate;
use crate::types::{ChatRequest, ChatResponse, ModelList};

/// How a streamed response body is framed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Server-sent events
    Sse,
    /// One JSON document per line
    Ndjson,
}

/// Where a provider reports token usage in a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageField {
    /// A nested object under this top-level key
    Object(&'static str),
    /// Counters directly on the top-level object
    TopLevel,
}

/// Provider request body in its wire format
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum WireRequest {
    OpenAi(OpenAiRequest),
    Anthropic(AnthropicRequest),
    Google(GoogleRequest),
    Ollama(OllamaChatRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderAdapter {
    OpenAi,
    Anthropic,
    Google,
    Ollama,
}

impl From<ProviderKind> for ProviderAdapter {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::OpenAi => Self::OpenAi,
            ProviderKind::Anthropic => Self::Anthropic,
            ProviderKind::Google => Self::Google,
            ProviderKind::Ollama => Self::Ollama,
        }
    }
}

impl ProviderAdapter {
    pub const fn kind(self) -> ProviderKind {
        match self {
            Self::OpenAi => ProviderKind::OpenAi,
            Self::Anthropic => ProviderKind::Anthropic,
            Self::Google => ProviderKind::Google,
            Self::Ollama => ProviderKind::Ollama,
        }
    }

    pub const fn framing(self) -> Framing {
        match self {
            Self::Ollama => Framing::Ndjson,
            Self::OpenAi | Self::Anthropic | Self::Google => Framing::Sse,
        }
    }

    pub const fn usage_field(self) -> UsageField {
        match self {
            Self::OpenAi | Self::Anthropic => UsageField::Object("usage"),
            Self::Google => UsageField::Object("usageMetadata"),
            Self::Ollama => UsageField::TopLevel,
        }
    }

    /// Wire request for a canonical request, `None` when there is nothing to send
    ///
    /// Google selects streaming through the endpoint, so `stream` does not
    /// change its body.
    pub fn to_provider_request(self, request: &ChatRequest, stream: bool) -> Option<WireRequest> {
        match self {
            Self::OpenAi => openai::to_request(request, stream).map(WireRequest::OpenAi),
            Self::Anthropic => anthropic::to_request(request, stream).map(WireRequest::Anthropic),
            Self::Google => google::to_request(request).map(WireRequest::Google),
            Self::Ollama => ollama::to_request(request, stream).map(WireRequest::Ollama),
        }
    }

    /// Canonical response for a successful non-streaming body
    pub fn to_canonical_response(self, body: &[u8], model: &str) -> Result<ChatResponse, serde_json::Error> {
        Ok(match self {
            Self::OpenAi => openai::to_response(serde_json::from_slice::<OpenAiResponse>(body)?, model),
            Self::Anthropic => anthropic::to_response(serde_json::from_slice::<AnthropicResponse>(body)?, model),
            Self::Google => google::to_response(serde_json::from_slice::<GoogleResponse>(body)?, model),
            Self::Ollama => ollama::to_response(serde_json::from_slice::<OllamaChatResponse>(body)?, model),
        })
    }

    pub fn model_list(self, body: &[u8], provider: &str) -> Result<ModelList, serde_json::Error> {
        Ok(match self {
            Self::OpenAi => openai::model_list(serde_json::from_slice::<OpenAiModelList>(body)?, provider),
            Self::Anthropic => anthropic::model_list(serde_json::from_slice::<AnthropicModelList>(body)?, provider),
            Self::Google => google::model_list(serde_json::from_slice::<GoogleModelList>(body)?, provider),
            Self::Ollama => ollama::model_list(serde_json::from_slice::<OllamaTags>(body)?, provider),
        })
    }

    /// Fresh per-stream decoder
    pub fn stream_decoder(self) -> StreamDecoder {
        match self {
            Self::OpenAi => StreamDecoder::OpenAi,
            Self::Anthropic => StreamDecoder::Anthropic(anthropic::AnthropicStreamState::new()),
            Self::Google => StreamDecoder::Google(google::GoogleStreamState::new()),
            Self::Ollama => StreamDecoder::Ollama(ollama::OllamaStreamState::new()),
        }
    }

    /// Error payload in a body or stream line, if it is one
    pub fn upstream_error(self, value: &Value) -> Option<UpstreamError> {
        UpstreamError::from_value(self.kind(), value)
    }
}

/// Stateful decoder for one stream
#[derive(Debug)]
pub enum StreamDecoder {
    OpenAi,
    Anthropic(anthropic::AnthropicStreamState),
    Google(google::GoogleStreamState),
    Ollama(ollama::OllamaStreamState),
}

impl StreamDecoder {
    /// Convert one parsed stream payload
    pub fn decode(&mut self, value: Value) -> Result<ChunkUpdate, serde_json::Error> {
        Ok(match self {
            Self::OpenAi => openai::chunk_update(serde_json::from_value::<OpenAiStreamChunk>(value)?),
            Self::Anthropic(state) => state.update(serde_json::from_value::<AnthropicStreamEvent>(value)?),
            Self::Google(state) => state.update(serde_json::from_value::<GoogleResponse>(value)?),
            Self::Ollama(state) => state.update(serde_json::from_value::<OllamaChatResponse>(value)?),
        })
    }
}
