use async_trait::async_trait;
use prism_core::{CanonicalError, ErrorKind, ExecutionContext, RequestKind};
use prism_llm::Upstream;
use reqwest::multipart::{Form, Part};

use super::TranscriptionProvider;
use crate::types::{TranscriptionRequest, TranscriptionResponse};

/// `OpenAI` `/audio/transcriptions`
pub(crate) struct OpenAiTranscription {
    upstream: Upstream,
}

impl OpenAiTranscription {
    pub const fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }
}

#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Formats whose body is JSON rather than plain text
fn is_json_format(format: Option<&str>) -> bool {
    matches!(format, None | Some("json" | "verbose_json"))
}

fn form(request: TranscriptionRequest, model: String) -> Result<Form, String> {
    let file = Part::bytes(request.audio)
        .file_name(request.filename)
        .mime_str(&request.content_type)
        .map_err(|e| format!("invalid audio content type: {e}"))?;

    let mut form = Form::new().part("file", file).text("model", model);

    if let Some(language) = request.language {
        form = form.text("language", language);
    }
    if let Some(prompt) = request.prompt {
        form = form.text("prompt", prompt);
    }
    if let Some(response_format) = request.response_format {
        form = form.text("response_format", response_format);
    }
    if let Some(temperature) = request.temperature {
        form = form.text("temperature", temperature.to_string());
    }

    Ok(form)
}

#[async_trait]
impl TranscriptionProvider for OpenAiTranscription {
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
        ctx: &ExecutionContext,
    ) -> Result<TranscriptionResponse, CanonicalError> {
        let origin = self.upstream.origin(&request.model, RequestKind::Transcription);
        self.upstream.admit(&origin, ctx)?;

        tracing::debug!(
            provider = %self.upstream.name(),
            model = %request.model,
            bytes = request.audio.len(),
            "sending transcription request"
        );

        let json = is_json_format(request.response_format.as_deref());
        let model = self.upstream.upstream_model(&request.model).to_owned();
        let form = form(request, model)
            .map_err(|message| CanonicalError::new(ErrorKind::InvalidRequest, message, origin.clone()))?;

        let builder = self
            .upstream
            .client()
            .post(self.upstream.url("audio/transcriptions"))
            .multipart(form);

        if json {
            let response: WhisperResponse = self.upstream.send_json(builder, ctx, &origin).await?;
            return Ok(TranscriptionResponse { text: response.text });
        }

        let response = self.upstream.send(builder.timeout(self.upstream.timeout()), ctx, &origin).await?;
        let mut body = Vec::new();
        self.upstream.read_all(response.bytes_stream(), &mut body, ctx, &origin).await?;

        Ok(TranscriptionResponse {
            text: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    fn name(&self) -> &str {
        self.upstream.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtitle_formats_are_plain_text() {
        assert!(is_json_format(None));
        assert!(is_json_format(Some("verbose_json")));
        assert!(!is_json_format(Some("srt")));
        assert!(!is_json_format(Some("text")));
    }

    #[test]
    fn bad_content_type_is_rejected() {
        let request = TranscriptionRequest {
            audio: Vec::new(),
            filename: "a.wav".to_owned(),
            content_type: "not a mime".to_owned(),
            model: "whisper-1".to_owned(),
            language: None,
            prompt: None,
            response_format: None,
            temperature: None,
        };
        assert!(form(request, "whisper-1".to_owned()).is_err());
    }
}
