use serde::{Deserialize, Serialize};

/// Embedding input that accepts either a single string or array of strings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EmbedInput {
    Single(String),
    Many(Vec<String>),
}

impl EmbedInput {
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(inputs) => inputs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(_) => false,
            Self::Many(inputs) => inputs.is_empty(),
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::Single(input) => vec![input],
            Self::Many(inputs) => inputs,
        }
    }
}

/// Canonical embedding request
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: EmbedInput,
    /// Number of dimensions for the output embeddings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    /// "float" or "base64", passed through where the provider supports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
}

impl EmbeddingRequest {
    pub fn new(model: impl Into<String>, input: EmbedInput) -> Self {
        Self {
            model: model.into(),
            input,
            dimensions: None,
            encoding_format: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmbeddingData {
    /// Position of the input this embedding belongs to
    pub index: usize,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u64,
    pub total_tokens: u64,
}

/// Canonical embedding response, ordered by input position
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,
    pub model: String,
    pub usage: EmbeddingUsage,
}
