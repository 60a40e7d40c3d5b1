use serde::{Deserialize, Serialize};

/// Speech synthesis request following the `OpenAI` TTS API format
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeechRequest {
    /// Model identifier (e.g. "tts-1")
    pub model: String,
    /// Text to synthesize into speech
    pub input: String,
    pub voice: String,
    /// Output audio format (mp3, opus, aac, flac, wav, pcm)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    /// Speech speed multiplier (0.25 to 4.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

/// Raw audio returned by a speech provider
pub struct SpeechResponse {
    pub audio: Vec<u8>,
    /// Content type of the audio (e.g. "audio/mpeg")
    pub content_type: String,
}

impl std::fmt::Debug for SpeechResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechResponse")
            .field("audio", &format_args!("{} bytes", self.audio.len()))
            .field("content_type", &self.content_type)
            .finish()
    }
}
