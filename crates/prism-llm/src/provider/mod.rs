//! Provider clients for LLM backends
//!
//! Every backend shares one HTTP client implementation. The wire protocol is
//! picked by the [`ProviderAdapter`], and the per-family modules only know
//! their endpoints and how to authenticate.

pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;

use std::borrow::Cow;

use async_trait::async_trait;
use http::StatusCode;
use prism_config::ProviderConfig;
use prism_core::{Attribution, CanonicalError, ErrorKind, ExecutionContext, Pool, ProviderKind, RequestKind};
use serde_json::Value;
use tokio::time::Instant;

use crate::adapter::{Framing, ProviderAdapter, WireRequest};
use crate::error::{BuildError, decode_error};
use crate::hooks::HookPipeline;
use crate::large_payload::{BodyRead, LargePayloadResult, read_body};
use crate::responses::{ResponsesEventStream, ResponsesRequest, ResponsesResponse, responses_events};
use crate::stream::{EventStream, NormalizerOptions, ndjson_lines, normalize, sse_lines};
use crate::types::{ChatRequest, ChatResponse, ModelList};
use crate::upstream::{Upstream, elapsed_ms, interruptible};

/// Idle body buffers kept per provider
const MAX_IDLE_BUFFERS: usize = 16;

/// Result of a non-streaming chat call
#[derive(Debug)]
pub enum ChatOutcome {
    Response(ChatResponse),
    /// The body was over the large-payload threshold and was not decoded
    LargePayload(LargePayloadResult),
}

impl ChatOutcome {
    /// The decoded response, if the body was small enough to decode
    pub fn into_response(self) -> Option<ChatResponse> {
        match self {
            Self::Response(response) => Some(response),
            Self::LargePayload(_) => None,
        }
    }
}

/// An upstream LLM backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configured provider name
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    async fn chat(&self, request: &ChatRequest, ctx: &ExecutionContext) -> Result<ChatOutcome, CanonicalError>;

    /// Start a stream; errors after the first byte arrive on the stream itself
    async fn chat_stream(&self, request: &ChatRequest, ctx: &ExecutionContext) -> Result<EventStream, CanonicalError>;

    async fn list_models(&self, ctx: &ExecutionContext) -> Result<ModelList, CanonicalError>;

    /// Responses API request answered through [`Provider::chat`]
    async fn responses(
        &self,
        request: &ResponsesRequest,
        ctx: &ExecutionContext,
    ) -> Result<ResponsesResponse, CanonicalError> {
        let ctx = ctx.clone().with_responses_fallback(true);
        match self.chat(&request.to_chat_request(), &ctx).await? {
            ChatOutcome::Response(response) => Ok(ResponsesResponse::from(response)),
            ChatOutcome::LargePayload(_) => Err(CanonicalError::new(
                ErrorKind::Decode,
                "response body too large to convert",
                Attribution::new(self.name(), &request.model, RequestKind::Responses),
            )),
        }
    }

    /// Responses API stream folded from [`Provider::chat_stream`]
    async fn responses_stream(
        &self,
        request: &ResponsesRequest,
        ctx: &ExecutionContext,
    ) -> Result<ResponsesEventStream, CanonicalError> {
        let ctx = ctx.clone().with_responses_fallback(true);
        let events = self.chat_stream(&request.to_chat_request(), &ctx).await?;
        Ok(responses_events(events))
    }
}

/// Kind a chat call is admitted and attributed as
const fn chat_kind(ctx: &ExecutionContext, stream: bool) -> RequestKind {
    match (ctx.responses_fallback, stream) {
        (false, false) => RequestKind::Chat,
        (false, true) => RequestKind::ChatStream,
        (true, false) => RequestKind::Responses,
        (true, true) => RequestKind::ResponsesStream,
    }
}

/// HTTP provider for any supported wire family
#[derive(Debug)]
pub struct HttpProvider {
    upstream: Upstream,
    adapter: ProviderAdapter,
    stream_buffer_size: usize,
    send_back_raw: bool,
    hooks: HookPipeline,
    buffers: Pool<Vec<u8>>,
}

impl HttpProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns an error when the configured endpoint or headers are unusable.
    pub fn new(name: impl Into<String>, config: &ProviderConfig) -> Result<Self, BuildError> {
        Ok(Self {
            upstream: Upstream::new(name, config)?,
            adapter: ProviderAdapter::from(config.provider_type),
            stream_buffer_size: config.stream_buffer_size.max(1),
            send_back_raw: config.send_back_raw_response,
            hooks: HookPipeline::new(),
            buffers: Pool::new(MAX_IDLE_BUFFERS),
        })
    }

    /// Attach post-processing hooks
    #[must_use]
    pub fn with_hooks(mut self, hooks: HookPipeline) -> Self {
        self.hooks = hooks;
        self
    }

    pub const fn adapter(&self) -> ProviderAdapter {
        self.adapter
    }

    /// Request with this provider's name stripped from the model id
    fn upstream_request<'a>(&self, request: &'a ChatRequest) -> Cow<'a, ChatRequest> {
        let model = self.upstream.upstream_model(&request.model);
        if model.len() == request.model.len() {
            return Cow::Borrowed(request);
        }

        Cow::Owned(ChatRequest {
            model: model.to_owned(),
            ..request.clone()
        })
    }

    fn send_back_raw(&self, ctx: &ExecutionContext) -> bool {
        self.send_back_raw || ctx.send_back_raw_response
    }

    fn chat_url(&self, model: &str, stream: bool) -> String {
        let base = self.upstream.base_url();
        match self.adapter {
            ProviderAdapter::OpenAi => openai::chat_url(base),
            ProviderAdapter::Anthropic => anthropic::chat_url(base),
            ProviderAdapter::Google => google::chat_url(base, model, stream),
            ProviderAdapter::Ollama => ollama::chat_url(base),
        }
    }

    fn models_url(&self) -> String {
        let base = self.upstream.base_url();
        match self.adapter {
            ProviderAdapter::OpenAi => openai::models_url(base),
            ProviderAdapter::Anthropic => anthropic::models_url(base),
            ProviderAdapter::Google => google::models_url(base),
            ProviderAdapter::Ollama => ollama::models_url(base),
        }
    }

    fn wire_request(&self, request: &ChatRequest, stream: bool, origin: &Attribution) -> Result<WireRequest, CanonicalError> {
        self.adapter.to_provider_request(request, stream).ok_or_else(|| {
            CanonicalError::new(ErrorKind::InvalidRequest, "request has no messages to send", origin.clone())
        })
    }

    async fn chat_inner(&self, request: &ChatRequest, ctx: &ExecutionContext) -> Result<ChatOutcome, CanonicalError> {
        let origin = self.upstream.origin(&request.model, chat_kind(ctx, false));
        self.upstream.admit(&origin, ctx)?;

        let request = self.upstream_request(request);
        let wire = self.wire_request(&request, false, &origin)?;

        let started = Instant::now();
        let builder = self
            .upstream
            .client()
            .post(self.chat_url(&request.model, false))
            .timeout(self.upstream.timeout())
            .json(&wire);
        let response = self.upstream.send(builder, ctx, &origin).await?;
        let latency_ms = elapsed_ms(started);

        let status = response.status();
        let content_length = response.content_length();
        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        // a converted response needs the whole body
        let large_payload = ctx.large_payload.filter(|_| !ctx.responses_fallback);
        let mut buf = self.buffers.acquire();
        let read = read_body(
            response.bytes_stream(),
            content_length,
            large_payload,
            self.adapter.usage_field(),
            &mut buf,
            &origin,
        );

        match interruptible(ctx, &origin, read).await?? {
            BodyRead::Passthrough { usage, body } => Ok(ChatOutcome::LargePayload(LargePayloadResult {
                status,
                content_type,
                content_length,
                usage,
                latency_ms,
                body,
            })),
            BodyRead::Buffered => {
                let mut response = self.decode_response(&buf, &request.model, status, &origin)?;
                response.latency_ms = latency_ms;
                if self.send_back_raw(ctx) {
                    response.raw = Some(String::from_utf8_lossy(&buf).into_owned());
                }

                tracing::debug!(
                    provider = %self.upstream.name(),
                    model = %response.model,
                    latency_ms,
                    "chat completed"
                );
                Ok(ChatOutcome::Response(self.hooks.process_response(response)))
            }
        }
    }

    /// Decode a success body, recognizing error payloads sent with a 2xx
    fn decode_response(
        &self,
        body: &[u8],
        model: &str,
        status: StatusCode,
        origin: &Attribution,
    ) -> Result<ChatResponse, CanonicalError> {
        self.adapter.to_canonical_response(body, model).map_err(|e| {
            let upstream = serde_json::from_slice::<Value>(body)
                .ok()
                .and_then(|value| self.adapter.upstream_error(&value));

            match upstream {
                Some(error) => error.into_canonical(Some(status), origin.clone()),
                None => {
                    tracing::warn!(provider = %self.upstream.name(), error = %e, "failed to decode response");
                    decode_error(&e, origin.clone())
                }
            }
        })
    }

    async fn chat_stream_inner(
        &self,
        request: &ChatRequest,
        ctx: &ExecutionContext,
    ) -> Result<EventStream, CanonicalError> {
        let origin = self.upstream.origin(&request.model, chat_kind(ctx, true));
        self.upstream.admit(&origin, ctx)?;

        let request = self.upstream_request(request);
        let wire = self.wire_request(&request, true, &origin)?;

        let builder = self
            .upstream
            .client()
            .post(self.chat_url(&request.model, true))
            .json(&wire);
        let response = self.upstream.send(builder, ctx, &origin).await?;

        let body = response.bytes_stream();
        let lines = match self.adapter.framing() {
            Framing::Sse => sse_lines(body, origin.clone()),
            Framing::Ndjson => ndjson_lines(body, origin.clone()),
        };

        let options = NormalizerOptions {
            buffer_size: self.stream_buffer_size,
            send_back_raw: self.send_back_raw(ctx),
        };
        Ok(normalize(lines, self.adapter, ctx.clone(), origin, self.hooks.clone(), options))
    }

    async fn list_models_inner(&self, ctx: &ExecutionContext) -> Result<ModelList, CanonicalError> {
        let origin = self.upstream.origin("", RequestKind::ListModels);
        self.upstream.admit(&origin, ctx)?;

        let builder = self
            .upstream
            .client()
            .get(self.models_url())
            .timeout(self.upstream.timeout());
        let response = self.upstream.send(builder, ctx, &origin).await?;

        let mut buf = self.buffers.acquire();
        self.upstream
            .read_all(response.bytes_stream(), &mut buf, ctx, &origin)
            .await?;

        self.adapter.model_list(&buf, self.upstream.name()).map_err(|e| {
            tracing::warn!(provider = %self.upstream.name(), error = %e, "failed to decode model list");
            decode_error(&e, origin)
        })
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        self.upstream.name()
    }

    fn kind(&self) -> ProviderKind {
        self.adapter.kind()
    }

    async fn chat(&self, request: &ChatRequest, ctx: &ExecutionContext) -> Result<ChatOutcome, CanonicalError> {
        self.chat_inner(request, ctx)
            .await
            .map_err(|e| self.hooks.process_error(e))
    }

    async fn chat_stream(&self, request: &ChatRequest, ctx: &ExecutionContext) -> Result<EventStream, CanonicalError> {
        self.chat_stream_inner(request, ctx)
            .await
            .map_err(|e| self.hooks.process_error(e))
    }

    async fn list_models(&self, ctx: &ExecutionContext) -> Result<ModelList, CanonicalError> {
        self.list_models_inner(ctx)
            .await
            .map_err(|e| self.hooks.process_error(e))
    }
}
