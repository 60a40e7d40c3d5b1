mod ollama;
mod openai;

use async_trait::async_trait;
use prism_config::ProviderConfig;
use prism_core::{CanonicalError, ExecutionContext, ProviderKind, RequestKind};
use prism_llm::Upstream;
use prism_llm::error::BuildError;

use crate::types::{EmbeddingRequest, EmbeddingResponse};

/// Embeddings backend
#[async_trait]
pub trait EmbeddingsProvider: Send + Sync {
    /// Generate embeddings for the given request
    async fn embed(&self, request: &EmbeddingRequest, ctx: &ExecutionContext) -> Result<EmbeddingResponse, CanonicalError>;

    fn name(&self) -> &str;
}

/// Embeddings client for a configured provider
///
/// Families without an embeddings API get a client that fails every call
/// with `unsupported-operation`.
pub fn build_provider(name: impl Into<String>, config: &ProviderConfig) -> Result<Box<dyn EmbeddingsProvider>, BuildError> {
    let upstream = Upstream::new(name, config)?;

    Ok(match config.provider_type {
        ProviderKind::OpenAi => Box::new(openai::OpenAiEmbeddings::new(upstream)),
        ProviderKind::Ollama => Box::new(ollama::OllamaEmbeddings::new(upstream)),
        ProviderKind::Anthropic | ProviderKind::Google => Box::new(Unsupported(upstream)),
    })
}

struct Unsupported(Upstream);

#[async_trait]
impl EmbeddingsProvider for Unsupported {
    async fn embed(&self, request: &EmbeddingRequest, _ctx: &ExecutionContext) -> Result<EmbeddingResponse, CanonicalError> {
        Err(CanonicalError::unsupported(
            self.0.origin(&request.model, RequestKind::Embedding),
        ))
    }

    fn name(&self) -> &str {
        self.0.name()
    }
}

/// Reject requests with no input before calling out
fn validate(request: &EmbeddingRequest, upstream: &Upstream) -> Result<(), CanonicalError> {
    if request.input.is_empty() {
        return Err(CanonicalError::new(
            prism_core::ErrorKind::InvalidRequest,
            "embedding request has no input",
            upstream.origin(&request.model, RequestKind::Embedding),
        ));
    }
    Ok(())
}
