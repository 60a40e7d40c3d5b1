#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod provider;
mod types;

pub use provider::{EmbeddingsProvider, build_provider};
pub use types::{EmbedInput, EmbeddingData, EmbeddingRequest, EmbeddingResponse, EmbeddingUsage};
