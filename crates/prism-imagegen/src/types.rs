use serde::{Deserialize, Serialize};

/// Image generation request in the `OpenAI` shape
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ImageRequest {
    /// Model identifier (e.g. "dall-e-3", "gpt-image-1")
    pub model: String,
    pub prompt: String,
    #[serde(default = "default_n")]
    pub n: u32,
    /// e.g. "1024x1024"
    #[serde(default = "default_size")]
    pub size: String,
    /// "standard" or "hd"
    #[serde(default = "default_quality")]
    pub quality: String,
    /// "url" or "`b64_json`"
    #[serde(default = "default_response_format")]
    pub response_format: String,
}

impl ImageRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            n: default_n(),
            size: default_size(),
            quality: default_quality(),
            response_format: default_response_format(),
        }
    }
}

const fn default_n() -> u32 {
    1
}

fn default_size() -> String {
    "1024x1024".to_owned()
}

fn default_quality() -> String {
    "standard".to_owned()
}

fn default_response_format() -> String {
    "url".to_owned()
}

/// One generated image, either hosted or inline
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ImageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    /// Prompt as rewritten by the model, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ImageResponse {
    /// Unix timestamp
    pub created: u64,
    pub data: Vec<ImageData>,
}
