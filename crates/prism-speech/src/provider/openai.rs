use async_trait::async_trait;
use prism_core::{CanonicalError, ExecutionContext, RequestKind};
use prism_llm::Upstream;

use super::SpeechProvider;
use crate::types::{SpeechRequest, SpeechResponse};

/// `OpenAI` `/audio/speech`
pub(crate) struct OpenAiSpeech {
    upstream: Upstream,
}

impl OpenAiSpeech {
    pub const fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }
}

#[derive(serde::Serialize)]
struct OpenAiSpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f64>,
}

#[async_trait]
impl SpeechProvider for OpenAiSpeech {
    async fn synthesize(&self, request: &SpeechRequest, ctx: &ExecutionContext) -> Result<SpeechResponse, CanonicalError> {
        let origin = self.upstream.origin(&request.model, RequestKind::Speech);
        self.upstream.admit(&origin, ctx)?;

        tracing::debug!(
            provider = %self.upstream.name(),
            model = %request.model,
            voice = %request.voice,
            input_len = request.input.len(),
            "sending speech request"
        );

        let body = OpenAiSpeechRequest {
            model: self.upstream.upstream_model(&request.model),
            input: &request.input,
            voice: &request.voice,
            response_format: request.response_format.as_deref(),
            speed: request.speed,
        };

        let builder = self
            .upstream
            .client()
            .post(self.upstream.url("audio/speech"))
            .timeout(self.upstream.timeout())
            .json(&body);
        let response = self.upstream.send(builder, ctx, &origin).await?;

        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_owned();

        let mut audio = Vec::new();
        self.upstream.read_all(response.bytes_stream(), &mut audio, ctx, &origin).await?;

        tracing::debug!(provider = %self.upstream.name(), bytes = audio.len(), "speech synthesis complete");

        Ok(SpeechResponse { audio, content_type })
    }

    fn name(&self) -> &str {
        self.upstream.name()
    }
}
