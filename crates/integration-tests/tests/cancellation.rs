mod harness;

use std::time::Duration;

use futures_util::StreamExt;
use harness::config::ConfigBuilder;
use harness::mock_upstream::{MockUpstream, Reply};
use prism_core::{ErrorKind, ExecutionContext, ProviderKind};
use prism_llm::{ChatRequest, HttpProvider, Message, Provider};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn provider(mock: &MockUpstream) -> HttpProvider {
    let config = ConfigBuilder::new()
        .with_provider("mock", ProviderKind::OpenAi, &mock.v1())
        .build();
    HttpProvider::new("mock", config.provider("mock").unwrap()).unwrap()
}

fn request() -> ChatRequest {
    ChatRequest::new("gpt-4o", vec![Message::user("Count to a million")])
}

fn stall(mock: &MockUpstream) {
    let first = json!({
        "id": "chatcmpl-3",
        "model": "gpt-4o",
        "choices": [{"index": 0, "delta": {"content": "1, 2"}, "finish_reason": null}]
    });
    mock.reply("/v1/chat/completions", Reply::Stall(vec![first.to_string()]));
}

#[tokio::test]
async fn cancelling_the_parent_ends_a_stalled_stream() {
    let mock = MockUpstream::start().await.unwrap();
    stall(&mock);

    let parent = CancellationToken::new();
    let ctx = ExecutionContext::new().with_parent(&parent);
    let mut stream = provider(&mock).chat_stream(&request(), &ctx).await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.delta.content.as_deref(), Some("1, 2"));

    parent.cancel();

    let err = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("stream reacts to cancellation")
        .unwrap()
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
    assert!(!err.is_retryable());
    assert!(stream.next().await.is_none());
    assert!(ctx.is_stream_ended());
}

#[tokio::test]
async fn deadline_ends_a_stalled_stream_with_timeout() {
    let mock = MockUpstream::start().await.unwrap();
    stall(&mock);

    let ctx = ExecutionContext::new().with_timeout(Duration::from_millis(300));
    let mut stream = provider(&mock).chat_stream(&request(), &ctx).await.unwrap();

    assert!(stream.next().await.unwrap().is_ok());

    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(err.is_retryable());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn cancelled_context_sends_nothing() {
    let mock = MockUpstream::start().await.unwrap();
    stall(&mock);

    let ctx = ExecutionContext::new();
    ctx.cancel();

    let err = provider(&mock).chat(&request(), &ctx).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn dropping_the_stream_releases_the_worker() {
    let mock = MockUpstream::start().await.unwrap();
    stall(&mock);

    let ctx = ExecutionContext::new();
    let mut stream = provider(&mock).chat_stream(&request(), &ctx).await.unwrap();
    stream.next().await.unwrap().unwrap();
    drop(stream);

    // The worker notices on its next send or on cancellation
    ctx.cancel();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !ctx.is_stream_ended() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("worker exits");
}
