//! HTTP plumbing shared by every upstream client
//!
//! Holds the configured endpoint, credentials and policy of one provider and
//! knows how to send a request under an [`ExecutionContext`].

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use prism_config::ProviderConfig;
use prism_core::context::interruption_error;
use prism_core::{Attribution, CanonicalError, ExecutionContext, ProviderKind, RequestKind};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use url::Url;

use crate::error::{BuildError, api_error, decode_error, transport_error};
use crate::large_payload::{read_error_body, read_to_end};
use crate::provider::{anthropic, google, ollama, openai};

pub struct Upstream {
    name: String,
    kind: ProviderKind,
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    headers: HeaderMap,
    timeout: Duration,
    allowed_requests: Option<Vec<RequestKind>>,
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl Upstream {
    /// # Errors
    ///
    /// Returns an error for unusable extra headers, a base URL that is not
    /// HTTP, or a client that fails to build.
    pub fn new(name: impl Into<String>, config: &ProviderConfig) -> Result<Self, BuildError> {
        let name = name.into();
        let kind = config.provider_type;

        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(default_base_url(kind))?,
        };
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(BuildError::UnsupportedScheme {
                name,
                scheme: base_url.scheme().to_owned(),
            });
        }

        let mut headers = HeaderMap::with_capacity(config.extra_headers.len());
        for (key, value) in &config.extra_headers {
            let invalid = || BuildError::InvalidHeader { name: key.clone() };
            let header = HeaderName::try_from(key.as_str()).map_err(|_| invalid())?;
            let value = HeaderValue::try_from(value.as_str()).map_err(|_| invalid())?;
            headers.insert(header, value);
        }

        // Whole-request timeouts are set per call, streams only get an idle limit
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .build()?;

        Ok(Self {
            name,
            kind,
            client,
            base_url,
            api_key: config.api_key.clone(),
            headers,
            timeout: config.timeout,
            allowed_requests: config.allowed_requests.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub const fn client(&self) -> &Client {
        &self.client
    }

    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for a path under the base URL
    pub fn url(&self, path: &str) -> String {
        endpoint(&self.base_url, path)
    }

    pub fn origin(&self, model: &str, kind: RequestKind) -> Attribution {
        Attribution::new(&self.name, model, kind)
    }

    /// Model id as the upstream knows it, without this provider's name
    pub fn upstream_model<'a>(&self, model: &'a str) -> &'a str {
        model
            .strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(model)
    }

    /// Check the allow-list and the context before any I/O
    pub fn admit(&self, origin: &Attribution, ctx: &ExecutionContext) -> Result<(), CanonicalError> {
        let allowed = self
            .allowed_requests
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&origin.request_kind));

        if !allowed {
            tracing::warn!(provider = %self.name, kind = %origin.request_kind, "request kind not allowed");
            return Err(CanonicalError::disallowed(origin.clone()));
        }

        ctx.check(origin)
    }

    /// Attach configured and per-request headers, then credentials
    ///
    /// A key on the context takes precedence over the configured one.
    pub fn authorize(&self, builder: RequestBuilder, ctx: &ExecutionContext) -> RequestBuilder {
        let key = ctx.api_key.as_ref().or(self.api_key.as_ref());
        let builder = builder.headers(self.headers.clone()).headers(ctx.extra_headers.clone());

        match self.kind {
            ProviderKind::OpenAi => openai::authorize(builder, key),
            ProviderKind::Anthropic => anthropic::authorize(builder, key),
            ProviderKind::Google => google::authorize(builder, key),
            ProviderKind::Ollama => ollama::authorize(builder, key),
        }
    }

    /// Send a request and return the response if its status is a success
    ///
    /// Error bodies are read with a cap and normalized.
    pub async fn send(
        &self,
        builder: RequestBuilder,
        ctx: &ExecutionContext,
        origin: &Attribution,
    ) -> Result<Response, CanonicalError> {
        let response = interruptible(ctx, origin, self.authorize(builder, ctx).send())
            .await?
            .map_err(|e| {
                tracing::error!(provider = %self.name, error = %e, "upstream request failed");
                transport_error(&e, origin.clone())
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = interruptible(ctx, origin, read_error_body(response.bytes_stream())).await?;
        tracing::warn!(provider = %self.name, status = %status, "upstream returned error");

        Err(api_error(self.kind, status, &body, origin.clone()))
    }

    /// Read a whole body into `buf`
    pub async fn read_all(
        &self,
        body: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
        buf: &mut Vec<u8>,
        ctx: &ExecutionContext,
        origin: &Attribution,
    ) -> Result<(), CanonicalError> {
        interruptible(ctx, origin, read_to_end(body, buf, origin)).await?
    }

    /// Send a request and decode its JSON response
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        ctx: &ExecutionContext,
        origin: &Attribution,
    ) -> Result<T, CanonicalError> {
        let response = self.send(builder.timeout(self.timeout), ctx, origin).await?;

        let mut buf = Vec::new();
        self.read_all(response.bytes_stream(), &mut buf, ctx, origin).await?;

        serde_json::from_slice(&buf).map_err(|e| {
            tracing::warn!(provider = %self.name, error = %e, "failed to decode response");
            decode_error(&e, origin.clone())
        })
    }
}

const fn default_base_url(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => openai::DEFAULT_BASE_URL,
        ProviderKind::Anthropic => anthropic::DEFAULT_BASE_URL,
        ProviderKind::Google => google::DEFAULT_BASE_URL,
        ProviderKind::Ollama => ollama::DEFAULT_BASE_URL,
    }
}

/// `base` joined with `path`, tolerating a trailing slash on either side
pub fn endpoint(base: &Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'))
}

pub(crate) fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Race `future` against the context's cancellation and deadline
pub async fn interruptible<F: Future>(
    ctx: &ExecutionContext,
    origin: &Attribution,
    future: F,
) -> Result<F::Output, CanonicalError> {
    tokio::select! {
        biased;
        kind = ctx.interrupted() => Err(interruption_error(kind, origin.clone())),
        output = future => Ok(output),
    }
}
