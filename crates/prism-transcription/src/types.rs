use serde::{Deserialize, Serialize};

/// Transcription request following the `OpenAI` Whisper API format
pub struct TranscriptionRequest {
    /// Raw audio data
    pub audio: Vec<u8>,
    pub filename: String,
    /// Content type of the audio file
    pub content_type: String,
    /// Model identifier (e.g. "whisper-1")
    pub model: String,
    /// Language hint (ISO 639-1)
    pub language: Option<String>,
    /// Prompt to guide transcription
    pub prompt: Option<String>,
    /// Response format (json, text, srt, `verbose_json`, vtt)
    pub response_format: Option<String>,
    /// Sampling temperature (0-1)
    pub temperature: Option<f32>,
}

impl std::fmt::Debug for TranscriptionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionRequest")
            .field("audio", &format_args!("{} bytes", self.audio.len()))
            .field("filename", &self.filename)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
}
