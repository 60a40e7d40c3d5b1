mod openai;

use async_trait::async_trait;
use prism_config::ProviderConfig;
use prism_core::{CanonicalError, ExecutionContext, ProviderKind, RequestKind};
use prism_llm::Upstream;
use prism_llm::error::BuildError;

use crate::types::{SpeechRequest, SpeechResponse};

/// Text-to-speech backend
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Synthesize text to speech
    async fn synthesize(&self, request: &SpeechRequest, ctx: &ExecutionContext) -> Result<SpeechResponse, CanonicalError>;

    fn name(&self) -> &str;
}

/// Speech client for a configured provider
///
/// Only `OpenAI`-compatible upstreams synthesize speech; the others fail
/// every call with `unsupported-operation`.
pub fn build_provider(name: impl Into<String>, config: &ProviderConfig) -> Result<Box<dyn SpeechProvider>, BuildError> {
    let upstream = Upstream::new(name, config)?;

    Ok(match config.provider_type {
        ProviderKind::OpenAi => Box::new(openai::OpenAiSpeech::new(upstream)),
        ProviderKind::Anthropic | ProviderKind::Google | ProviderKind::Ollama => Box::new(Unsupported(upstream)),
    })
}

struct Unsupported(Upstream);

#[async_trait]
impl SpeechProvider for Unsupported {
    async fn synthesize(&self, request: &SpeechRequest, _ctx: &ExecutionContext) -> Result<SpeechResponse, CanonicalError> {
        Err(CanonicalError::unsupported(self.0.origin(&request.model, RequestKind::Speech)))
    }

    fn name(&self) -> &str {
        self.0.name()
    }
}
