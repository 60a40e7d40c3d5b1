mod openai;

use async_trait::async_trait;
use prism_config::ProviderConfig;
use prism_core::{CanonicalError, ExecutionContext, ProviderKind, RequestKind};
use prism_llm::Upstream;
use prism_llm::error::BuildError;

use crate::types::{ImageRequest, ImageResponse};

/// Image generation backend
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate(&self, request: &ImageRequest, ctx: &ExecutionContext) -> Result<ImageResponse, CanonicalError>;

    fn name(&self) -> &str;
}

/// Image client for a configured provider
pub fn build_provider(name: impl Into<String>, config: &ProviderConfig) -> Result<Box<dyn ImageProvider>, BuildError> {
    let upstream = Upstream::new(name, config)?;

    Ok(match config.provider_type {
        ProviderKind::OpenAi => Box::new(openai::OpenAiImages::new(upstream)),
        ProviderKind::Anthropic | ProviderKind::Google | ProviderKind::Ollama => Box::new(Unsupported(upstream)),
    })
}

struct Unsupported(Upstream);

#[async_trait]
impl ImageProvider for Unsupported {
    async fn generate(&self, request: &ImageRequest, _ctx: &ExecutionContext) -> Result<ImageResponse, CanonicalError> {
        Err(CanonicalError::unsupported(
            self.0.origin(&request.model, RequestKind::ImageGeneration),
        ))
    }

    fn name(&self) -> &str {
        self.0.name()
    }
}
