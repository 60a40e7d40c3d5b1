mod harness;

use futures_util::StreamExt;
use harness::config::ConfigBuilder;
use harness::mock_upstream::{MockUpstream, Reply};
use prism_core::{ExecutionContext, ProviderKind};
use prism_llm::responses::{OutputContent, OutputItem, ResponseStatus, ResponsesInput};
use prism_llm::types::Usage;
use prism_llm::{ChatOutcome, ChatRequest, HttpProvider, LargePayloadResult, Message, Provider, ResponsesRequest};
use serde_json::json;

const THRESHOLD: usize = 1024;

fn setup(mock: &MockUpstream) -> (HttpProvider, ExecutionContext) {
    let config = ConfigBuilder::new()
        .with_provider("mock", ProviderKind::OpenAi, &mock.v1())
        .with_large_payload(THRESHOLD, 256)
        .build();

    let provider = HttpProvider::new("mock", config.provider("mock").unwrap()).unwrap();
    let ctx = ExecutionContext::new().with_large_payload(config.large_payload.map(Into::into));
    (provider, ctx)
}

/// Completion with usage ahead of a long message
fn completion(content_len: usize) -> Vec<u8> {
    let head = r#"{"id":"chatcmpl-big","model":"gpt-4o","created":1,"usage":{"prompt_tokens":5,"completion_tokens":7,"total_tokens":12},"#;
    let choices = json!([{
        "index": 0,
        "message": {"role": "assistant", "content": "a".repeat(content_len)},
        "finish_reason": "length"
    }]);
    format!("{head}\"choices\":{choices}}}").into_bytes()
}

fn request() -> ChatRequest {
    ChatRequest::new("gpt-4o", vec![Message::user("write a lot")])
}

async fn collect_body(payload: LargePayloadResult) -> Vec<u8> {
    let mut body = payload.body;
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

#[tokio::test]
async fn known_length_over_threshold_passes_through() {
    let mock = MockUpstream::start().await.unwrap();
    let body = completion(8 * 1024);
    mock.reply(
        "/v1/chat/completions",
        Reply::Sized {
            content_type: "application/json",
            body: body.clone(),
        },
    );

    let (provider, ctx) = setup(&mock);
    let ChatOutcome::LargePayload(payload) = provider.chat(&request(), &ctx).await.unwrap() else {
        panic!("expected passthrough");
    };

    assert_eq!(payload.status, 200);
    assert_eq!(payload.content_length, Some(body.len() as u64));
    assert_eq!(payload.content_type.as_deref(), Some("application/json"));
    assert_eq!(payload.usage, Some(Usage::new(5, 7)));
    assert_eq!(collect_body(payload).await, body);
}

#[tokio::test]
async fn unknown_length_over_threshold_passes_through() {
    let mock = MockUpstream::start().await.unwrap();
    let body = completion(4 * 1024);
    mock.reply(
        "/v1/chat/completions",
        Reply::Chunked {
            content_type: "application/json",
            chunks: body.chunks(300).map(<[u8]>::to_vec).collect(),
        },
    );

    let (provider, ctx) = setup(&mock);
    let ChatOutcome::LargePayload(payload) = provider.chat(&request(), &ctx).await.unwrap() else {
        panic!("expected passthrough");
    };

    assert_eq!(payload.content_length, None);
    assert_eq!(payload.usage, Some(Usage::new(5, 7)));
    assert_eq!(collect_body(payload).await, body);
}

#[tokio::test]
async fn small_bodies_are_decoded() {
    let mock = MockUpstream::start().await.unwrap();
    let (provider, ctx) = setup(&mock);

    let body = completion(16);
    assert!(body.len() <= THRESHOLD);

    mock.reply(
        "/v1/chat/completions",
        Reply::Sized {
            content_type: "application/json",
            body: body.clone(),
        },
    );
    let response = provider.chat(&request(), &ctx).await.unwrap().into_response().unwrap();
    assert_eq!(response.usage, Some(Usage::new(5, 7)));

    mock.reply(
        "/v1/chat/completions",
        Reply::Chunked {
            content_type: "application/json",
            chunks: body.chunks(10).map(<[u8]>::to_vec).collect(),
        },
    );
    let response = provider.chat(&request(), &ctx).await.unwrap().into_response().unwrap();
    assert_eq!(response.id, "chatcmpl-big");
}

#[tokio::test]
async fn without_threshold_everything_is_decoded() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply(
        "/v1/chat/completions",
        Reply::Sized {
            content_type: "application/json",
            body: completion(64 * 1024),
        },
    );

    let (provider, _) = setup(&mock);
    let outcome = provider.chat(&request(), &ExecutionContext::new()).await.unwrap();
    assert!(matches!(outcome, ChatOutcome::Response(_)));
}

#[tokio::test]
async fn responses_fallback_reads_the_whole_body() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply(
        "/v1/chat/completions",
        Reply::Sized {
            content_type: "application/json",
            body: completion(8 * 1024),
        },
    );

    let (provider, ctx) = setup(&mock);
    let request = ResponsesRequest::new("gpt-4o", ResponsesInput::Text("write a lot".into()));
    let response = provider.responses(&request, &ctx).await.unwrap();

    assert_eq!(response.status, ResponseStatus::Incomplete);
    assert_eq!(response.usage.unwrap().output_tokens, 7);
    assert!(matches!(
        &response.output[0],
        OutputItem::Message { content, .. }
            if matches!(&content[0], OutputContent::OutputText { text, .. } if text.len() == 8 * 1024)
    ));
}
