use serde::{Deserialize, Serialize};

/// Upstream wire protocol family
///
/// The set is closed: adding a provider means adding a variant here and an
/// adapter arm in `prism-llm`, never inspecting types at runtime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderKind {
    /// `OpenAI` chat completions and every compatible server
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAi,
    /// Anthropic Messages API
    Anthropic,
    /// Google Generative Language API
    Google,
    /// Ollama native API
    Ollama,
}

impl ProviderKind {
    /// Whether tool calls are matched to their results by function name
    /// rather than an opaque id
    pub const fn is_name_correlated(self) -> bool {
        matches!(self, Self::Google | Self::Ollama)
    }
}

/// Operation a caller asked the gateway to perform
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestKind {
    Chat,
    ChatStream,
    /// Responses API request served through the chat endpoint
    Responses,
    ResponsesStream,
    Embedding,
    Speech,
    Transcription,
    ImageGeneration,
    ListModels,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn provider_kind_round_trips_through_strings() {
        assert_eq!(ProviderKind::OpenAi.to_string(), "openai");
        assert_eq!(ProviderKind::from_str("ollama").unwrap(), ProviderKind::Ollama);

        let parsed: ProviderKind = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(parsed, ProviderKind::OpenAi);
    }

    #[test]
    fn name_correlated_families() {
        assert!(ProviderKind::Ollama.is_name_correlated());
        assert!(ProviderKind::Google.is_name_correlated());
        assert!(!ProviderKind::OpenAi.is_name_correlated());
        assert!(!ProviderKind::Anthropic.is_name_correlated());
    }

    #[test]
    fn request_kind_display() {
        assert_eq!(RequestKind::ChatStream.to_string(), "chat_stream");
        assert_eq!(RequestKind::ImageGeneration.as_ref(), "image_generation");
        assert_eq!(RequestKind::ResponsesStream.to_string(), "responses_stream");
    }
}
