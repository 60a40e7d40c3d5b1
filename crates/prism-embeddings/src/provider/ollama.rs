use async_trait::async_trait;
use prism_core::{CanonicalError, ExecutionContext, RequestKind};
use prism_llm::Upstream;
use prism_llm::protocol::ollama::{OllamaEmbedInput, OllamaEmbedRequest, OllamaEmbedResponse};

use super::{EmbeddingsProvider, validate};
use crate::types::{EmbedInput, EmbeddingData, EmbeddingRequest, EmbeddingResponse, EmbeddingUsage};

/// Ollama `/api/embed`
pub(crate) struct OllamaEmbeddings {
    upstream: Upstream,
}

impl OllamaEmbeddings {
    pub const fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }
}

fn wire_request(model: &str, request: &EmbeddingRequest) -> OllamaEmbedRequest {
    OllamaEmbedRequest {
        model: model.to_owned(),
        input: match &request.input {
            EmbedInput::Single(input) => OllamaEmbedInput::Single(input.clone()),
            EmbedInput::Many(inputs) => OllamaEmbedInput::Many(inputs.clone()),
        },
        truncate: None,
        dimensions: request.dimensions,
        keep_alive: None,
    }
}

fn canonical_response(request: &EmbeddingRequest, response: OllamaEmbedResponse) -> EmbeddingResponse {
    let prompt_tokens = response.prompt_eval_count.unwrap_or_default();

    EmbeddingResponse {
        data: response
            .embeddings
            .into_iter()
            .enumerate()
            .map(|(index, embedding)| EmbeddingData { index, embedding })
            .collect(),
        model: if response.model.is_empty() { request.model.clone() } else { response.model },
        usage: EmbeddingUsage {
            prompt_tokens,
            total_tokens: prompt_tokens,
        },
    }
}

#[async_trait]
impl EmbeddingsProvider for OllamaEmbeddings {
    async fn embed(&self, request: &EmbeddingRequest, ctx: &ExecutionContext) -> Result<EmbeddingResponse, CanonicalError> {
        let origin = self.upstream.origin(&request.model, RequestKind::Embedding);
        self.upstream.admit(&origin, ctx)?;
        validate(request, &self.upstream)?;

        let wire = wire_request(self.upstream.upstream_model(&request.model), request);
        tracing::debug!(provider = %self.upstream.name(), model = %wire.model, "sending embeddings request");

        let builder = self.upstream.client().post(self.upstream.url("api/embed")).json(&wire);
        let response: OllamaEmbedResponse = self.upstream.send_json(builder, ctx, &origin).await?;

        Ok(canonical_response(request, response))
    }

    fn name(&self) -> &str {
        self.upstream.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_input_stays_scalar() {
        let request = EmbeddingRequest::new("local/nomic", EmbedInput::Single("hello".to_owned()));
        let wire = serde_json::to_value(wire_request("nomic", &request)).unwrap();
        assert_eq!(wire, serde_json::json!({ "model": "nomic", "input": "hello" }));
    }

    #[test]
    fn embeddings_are_indexed_in_order() {
        let request = EmbeddingRequest::new("local/nomic", EmbedInput::Many(vec!["a".into(), "b".into()]));
        let response: OllamaEmbedResponse = serde_json::from_str(
            r#"{"model":"nomic","embeddings":[[0.1,0.2],[0.3,0.4]],"prompt_eval_count":4}"#,
        )
        .unwrap();

        let response = canonical_response(&request, response);
        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data[1].index, 1);
        assert_eq!(response.data[1].embedding, vec![0.3, 0.4]);
        assert_eq!(response.usage, EmbeddingUsage { prompt_tokens: 4, total_tokens: 4 });
    }
}
