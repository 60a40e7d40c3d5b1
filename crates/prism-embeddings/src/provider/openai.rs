use async_trait::async_trait;
use prism_core::{CanonicalError, ExecutionContext, RequestKind};
use prism_llm::Upstream;
use serde::{Deserialize, Serialize};

use super::{EmbeddingsProvider, validate};
use crate::types::{EmbeddingData, EmbeddingRequest, EmbeddingResponse, EmbeddingUsage};

/// `OpenAI`-compatible embeddings
pub(crate) struct OpenAiEmbeddings {
    upstream: Upstream,
}

impl OpenAiEmbeddings {
    pub const fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }
}

/// Wire format for the `OpenAI` embeddings API request
#[derive(Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: Vec<String>,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding_format: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: EmbeddingUsage,
}

#[async_trait]
impl EmbeddingsProvider for OpenAiEmbeddings {
    async fn embed(&self, request: &EmbeddingRequest, ctx: &ExecutionContext) -> Result<EmbeddingResponse, CanonicalError> {
        let origin = self.upstream.origin(&request.model, RequestKind::Embedding);
        self.upstream.admit(&origin, ctx)?;
        validate(request, &self.upstream)?;

        let wire = OpenAiEmbeddingRequest {
            input: request.input.clone().into_vec(),
            model: self.upstream.upstream_model(&request.model),
            encoding_format: request.encoding_format.as_deref(),
            dimensions: request.dimensions,
        };

        tracing::debug!(provider = %self.upstream.name(), model = %request.model, "sending embeddings request");

        let builder = self.upstream.client().post(self.upstream.url("embeddings")).json(&wire);
        let response: OpenAiEmbeddingResponse = self.upstream.send_json(builder, ctx, &origin).await?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        Ok(EmbeddingResponse {
            data,
            model: if response.model.is_empty() { request.model.clone() } else { response.model },
            usage: response.usage,
        })
    }

    fn name(&self) -> &str {
        self.upstream.name()
    }
}
