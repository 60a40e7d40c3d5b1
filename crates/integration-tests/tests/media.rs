mod harness;

use axum::http::StatusCode;
use harness::config::ConfigBuilder;
use harness::mock_upstream::{MockUpstream, Reply};
use prism_core::{ErrorKind, ExecutionContext, ProviderKind};
use prism_embeddings::{EmbedInput, EmbeddingRequest};
use prism_imagegen::ImageRequest;
use prism_speech::SpeechRequest;
use prism_transcription::TranscriptionRequest;
use serde_json::json;

fn config(mock: &MockUpstream) -> prism_config::Config {
    ConfigBuilder::new()
        .with_provider("openai", ProviderKind::OpenAi, &mock.v1())
        .build()
}

#[tokio::test]
async fn embeddings_are_ordered_by_index() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply(
        "/v1/embeddings",
        Reply::Json(
            StatusCode::OK,
            json!({
                "object": "list",
                "data": [
                    {"object": "embedding", "index": 1, "embedding": [0.5]},
                    {"object": "embedding", "index": 0, "embedding": [0.25]}
                ],
                "model": "text-embedding-3-small",
                "usage": {"prompt_tokens": 4, "total_tokens": 4}
            }),
        ),
    );

    let config = config(&mock);
    let provider = prism_embeddings::build_provider("openai", config.provider("openai").unwrap()).unwrap();
    let mut request = EmbeddingRequest::new(
        "openai/text-embedding-3-small",
        EmbedInput::Many(vec!["a".to_owned(), "b".to_owned()]),
    );
    request.dimensions = Some(256);

    let response = provider.embed(&request, &ExecutionContext::new()).await.unwrap();
    assert_eq!(response.data[0].embedding, vec![0.25]);
    assert_eq!(response.data[1].embedding, vec![0.5]);
    assert_eq!(response.usage.total_tokens, 4);

    let sent = mock.last_request();
    assert_eq!(sent.header("authorization"), Some("Bearer test-key"));
    assert_eq!(
        sent.json(),
        json!({"input": ["a", "b"], "model": "text-embedding-3-small", "dimensions": 256})
    );
}

#[tokio::test]
async fn speech_returns_audio_bytes() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply(
        "/v1/audio/speech",
        Reply::Sized {
            content_type: "audio/opus",
            body: vec![0x4f, 0x67, 0x67, 0x53],
        },
    );

    let config = config(&mock);
    let provider = prism_speech::build_provider("openai", config.provider("openai").unwrap()).unwrap();
    let request = SpeechRequest {
        model: "openai/tts-1".to_owned(),
        input: "Hello".to_owned(),
        voice: "alloy".to_owned(),
        response_format: Some("opus".to_owned()),
        speed: None,
    };

    let response = provider.synthesize(&request, &ExecutionContext::new()).await.unwrap();
    assert_eq!(response.audio, b"OggS");
    assert_eq!(response.content_type, "audio/opus");
    assert_eq!(mock.last_request().json()["model"], "tts-1");
}

#[tokio::test]
async fn transcription_sends_multipart_form() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply(
        "/v1/audio/transcriptions",
        Reply::Json(StatusCode::OK, json!({"text": "hello world"})),
    );

    let config = config(&mock);
    let provider = prism_transcription::build_provider("openai", config.provider("openai").unwrap()).unwrap();
    let request = TranscriptionRequest {
        audio: b"RIFF....WAVE".to_vec(),
        filename: "clip.wav".to_owned(),
        content_type: "audio/wav".to_owned(),
        model: "openai/whisper-1".to_owned(),
        language: Some("en".to_owned()),
        prompt: None,
        response_format: None,
        temperature: Some(0.2),
    };

    let response = provider.transcribe(request, &ExecutionContext::new()).await.unwrap();
    assert_eq!(response.text, "hello world");

    let sent = mock.last_request();
    assert!(sent.header("content-type").unwrap().starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&sent.body);
    assert!(body.contains("filename=\"clip.wav\""));
    assert!(body.contains("whisper-1"));
    assert!(body.contains("name=\"language\""));
}

#[tokio::test]
async fn plain_text_transcripts_are_returned_verbatim() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply(
        "/v1/audio/transcriptions",
        Reply::Sized {
            content_type: "text/plain",
            body: b"1\n00:00:00,000 --> 00:00:01,000\nhello\n".to_vec(),
        },
    );

    let config = config(&mock);
    let provider = prism_transcription::build_provider("openai", config.provider("openai").unwrap()).unwrap();
    let request = TranscriptionRequest {
        audio: vec![0; 8],
        filename: "clip.wav".to_owned(),
        content_type: "audio/wav".to_owned(),
        model: "whisper-1".to_owned(),
        language: None,
        prompt: None,
        response_format: Some("srt".to_owned()),
        temperature: None,
    };

    let response = provider.transcribe(request, &ExecutionContext::new()).await.unwrap();
    assert!(response.text.contains("00:00:00,000 --> 00:00:01,000"));
}

#[tokio::test]
async fn images_are_generated() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply(
        "/v1/images/generations",
        Reply::Json(
            StatusCode::OK,
            json!({"created": 1_713_833_628, "data": [
                {"url": "https://example.com/lighthouse.png", "revised_prompt": "A lighthouse at dusk"}
            ]}),
        ),
    );

    let config = config(&mock);
    let provider = prism_imagegen::build_provider("openai", config.provider("openai").unwrap()).unwrap();

    let response = provider
        .generate(&ImageRequest::new("openai/dall-e-3", "a lighthouse"), &ExecutionContext::new())
        .await
        .unwrap();
    assert_eq!(response.data[0].url.as_deref(), Some("https://example.com/lighthouse.png"));
    assert_eq!(response.data[0].b64_json, None);

    let body = mock.last_request().json();
    assert_eq!(body["model"], "dall-e-3");
    assert_eq!(body["size"], "1024x1024");
}

#[tokio::test]
async fn upstream_errors_are_canonical_for_media_too() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply(
        "/v1/images/generations",
        Reply::Json(
            StatusCode::BAD_REQUEST,
            json!({"error": {"message": "Your request was rejected by the safety system.",
                "type": "invalid_request_error", "code": "content_policy_violation"}}),
        ),
    );

    let config = config(&mock);
    let provider = prism_imagegen::build_provider("openai", config.provider("openai").unwrap()).unwrap();

    let err = provider
        .generate(&ImageRequest::new("dall-e-3", "something"), &ExecutionContext::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ProviderApi);
    assert_eq!(err.code.as_deref(), Some("content_policy_violation"));
    assert_eq!(err.origin.request_kind, prism_core::RequestKind::ImageGeneration);
}
