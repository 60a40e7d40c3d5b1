use async_trait::async_trait;
use prism_core::{CanonicalError, ExecutionContext, RequestKind};
use prism_llm::Upstream;
use serde::Serialize;

use super::ImageProvider;
use crate::types::{ImageRequest, ImageResponse};

/// `OpenAI` `/images/generations`
pub(crate) struct OpenAiImages {
    upstream: Upstream,
}

impl OpenAiImages {
    pub const fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }
}

#[derive(Serialize)]
struct OpenAiImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    quality: &'a str,
    response_format: &'a str,
}

#[async_trait]
impl ImageProvider for OpenAiImages {
    async fn generate(&self, request: &ImageRequest, ctx: &ExecutionContext) -> Result<ImageResponse, CanonicalError> {
        let origin = self.upstream.origin(&request.model, RequestKind::ImageGeneration);
        self.upstream.admit(&origin, ctx)?;

        let wire = OpenAiImageRequest {
            model: self.upstream.upstream_model(&request.model),
            prompt: &request.prompt,
            n: request.n,
            size: &request.size,
            quality: &request.quality,
            response_format: &request.response_format,
        };

        tracing::debug!(provider = %self.upstream.name(), model = %wire.model, n = wire.n, "sending image request");

        let builder = self
            .upstream
            .client()
            .post(self.upstream.url("images/generations"))
            .json(&wire);
        let response: ImageResponse = self.upstream.send_json(builder, ctx, &origin).await?;

        tracing::debug!(provider = %self.upstream.name(), images = response.data.len(), "image generation complete");

        Ok(response)
    }

    fn name(&self) -> &str {
        self.upstream.name()
    }
}
