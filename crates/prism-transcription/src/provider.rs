mod openai;

use async_trait::async_trait;
use prism_config::ProviderConfig;
use prism_core::{CanonicalError, ExecutionContext, ProviderKind, RequestKind};
use prism_llm::Upstream;
use prism_llm::error::BuildError;

use crate::types::{TranscriptionRequest, TranscriptionResponse};

/// Speech-to-text backend
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Transcribe audio to text
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
        ctx: &ExecutionContext,
    ) -> Result<TranscriptionResponse, CanonicalError>;

    fn name(&self) -> &str;
}

/// Transcription client for a configured provider
pub fn build_provider(
    name: impl Into<String>,
    config: &ProviderConfig,
) -> Result<Box<dyn TranscriptionProvider>, BuildError> {
    let upstream = Upstream::new(name, config)?;

    Ok(match config.provider_type {
        ProviderKind::OpenAi => Box::new(openai::OpenAiTranscription::new(upstream)),
        ProviderKind::Anthropic | ProviderKind::Google | ProviderKind::Ollama => Box::new(Unsupported(upstream)),
    })
}

struct Unsupported(Upstream);

#[async_trait]
impl TranscriptionProvider for Unsupported {
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
        _ctx: &ExecutionContext,
    ) -> Result<TranscriptionResponse, CanonicalError> {
        Err(CanonicalError::unsupported(
            self.0.origin(&request.model, RequestKind::Transcription),
        ))
    }

    fn name(&self) -> &str {
        self.0.name()
    }
}
