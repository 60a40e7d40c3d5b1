mod harness;

use axum::http::StatusCode;
use harness::config::ConfigBuilder;
use harness::mock_upstream::{MockUpstream, Reply};
use harness::{assert_well_formed, drain, ok_events, text_of};
use prism_core::{ErrorKind, ExecutionContext, ProviderKind, RequestKind};
use prism_llm::types::{FinishReason, Usage};
use prism_llm::{ChatRequest, HttpProvider, Message, Provider};
use secrecy::SecretString;
use serde_json::json;

fn provider(mock: &MockUpstream) -> HttpProvider {
    let config = ConfigBuilder::new()
        .with_provider("mock", ProviderKind::OpenAi, &mock.v1())
        .with_header("x-team", "search")
        .build();
    HttpProvider::new("mock", config.provider("mock").unwrap()).unwrap()
}

fn hello() -> ChatRequest {
    ChatRequest::new("mock/gpt-4o-mini", vec![Message::user("Hello")])
}

fn completion() -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4o-mini-2024-07-18",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hello there"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
    })
}

fn chunk(delta: serde_json::Value, finish_reason: Option<&str>) -> String {
    json!({
        "id": "chatcmpl-2",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": "gpt-4o-mini",
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
    })
    .to_string()
}

#[tokio::test]
async fn chat_returns_canonical_response() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply("/v1/chat/completions", Reply::Json(StatusCode::OK, completion()));

    let response = provider(&mock)
        .chat(&hello(), &ExecutionContext::new())
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert_eq!(response.id, "chatcmpl-1");
    assert_eq!(response.model, "gpt-4o-mini-2024-07-18");
    assert_eq!(response.first_message().and_then(Message::text).as_deref(), Some("Hello there"));
    assert_eq!(response.choices[0].finish_reason, Some(FinishReason::Stop));
    assert_eq!(response.usage, Some(Usage::new(9, 3)));
    assert!(response.raw.is_none());

    let sent = mock.last_request();
    assert_eq!(sent.path, "/v1/chat/completions");
    assert_eq!(sent.header("authorization"), Some("Bearer test-key"));
    assert_eq!(sent.header("x-team"), Some("search"));

    let body = sent.json();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["messages"][0]["content"], "Hello");
    assert!(body.get("stream_options").is_none());
}

#[tokio::test]
async fn raw_response_is_returned_on_request() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply("/v1/chat/completions", Reply::Json(StatusCode::OK, completion()));

    let ctx = ExecutionContext::new().with_raw_response(true);
    let response = provider(&mock).chat(&hello(), &ctx).await.unwrap().into_response().unwrap();

    let raw: serde_json::Value = serde_json::from_str(response.raw.as_deref().unwrap()).unwrap();
    assert_eq!(raw, completion());
}

#[tokio::test]
async fn caller_key_replaces_configured_key() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply("/v1/chat/completions", Reply::Json(StatusCode::OK, completion()));

    let ctx = ExecutionContext::new().with_api_key(Some(SecretString::from("caller-key")));
    provider(&mock).chat(&hello(), &ctx).await.unwrap();

    assert_eq!(mock.last_request().header("authorization"), Some("Bearer caller-key"));
}

#[tokio::test]
async fn stream_is_normalized() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply(
        "/v1/chat/completions",
        Reply::Sse(vec![
            chunk(json!({"role": "assistant", "content": ""}), None),
            chunk(json!({"content": "Hello"}), None),
            chunk(json!({"content": " world"}), None),
            chunk(
                json!({"tool_calls": [{"index": 0, "id": "call_1", "type": "function",
                    "function": {"name": "weather", "arguments": ""}}]}),
                None,
            ),
            chunk(json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"city\":\"Oslo\"}"}}]}), None),
            chunk(json!({}), Some("tool_calls")),
            json!({
                "id": "chatcmpl-2",
                "object": "chat.completion.chunk",
                "model": "gpt-4o-mini",
                "choices": [],
                "usage": {"prompt_tokens": 20, "completion_tokens": 11, "total_tokens": 31}
            })
            .to_string(),
            "[DONE]".to_owned(),
        ]),
    );

    let stream = provider(&mock).chat_stream(&hello(), &ExecutionContext::new()).await.unwrap();
    let events = ok_events(drain(stream).await);

    assert_well_formed(&events);
    assert_eq!(text_of(&events), "Hello world");
    assert!(events.iter().all(|event| event.id.as_deref() == Some("chatcmpl-2")));

    let calls: Vec<_> = events.iter().flat_map(|event| event.delta.tool_calls.iter()).collect();
    assert_eq!(calls[0].id.as_deref(), Some("call_1"));
    assert_eq!(calls[0].name.as_deref(), Some("weather"));
    let arguments: String = calls.iter().filter_map(|call| call.arguments.as_deref()).collect();
    assert_eq!(arguments, r#"{"city":"Oslo"}"#);

    let terminal = events.last().unwrap();
    assert_eq!(terminal.finish_reason, Some(FinishReason::ToolCalls));
    assert_eq!(terminal.usage, Some(Usage::new(20, 11)));
    assert!(events[..events.len() - 1].iter().all(|event| event.usage.is_none()));

    let body = mock.last_request().json();
    assert_eq!(body["stream"], true);
    assert_eq!(body["stream_options"]["include_usage"], true);
}

#[tokio::test]
async fn mid_stream_error_ends_the_stream() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply(
        "/v1/chat/completions",
        Reply::Sse(vec![
            chunk(json!({"content": "partial"}), None),
            json!({"error": {"message": "server overloaded", "type": "server_error"}}).to_string(),
            chunk(json!({"content": "never seen"}), None),
        ]),
    );

    let ctx = ExecutionContext::new();
    let stream = provider(&mock).chat_stream(&hello(), &ctx).await.unwrap();
    let results = drain(stream).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().delta.content.as_deref(), Some("partial"));

    let err = results[1].as_ref().unwrap_err();
    assert_eq!(err.kind, ErrorKind::ProviderApi);
    assert_eq!(err.message, "server overloaded");
    assert_eq!(err.error_type.as_deref(), Some("server_error"));
    assert_eq!(err.origin.request_kind, RequestKind::ChatStream);
    assert!(ctx.is_stream_ended());
}

#[tokio::test]
async fn error_payloads_are_normalized() {
    let mock = MockUpstream::start().await.unwrap();
    let provider = provider(&mock);
    let ctx = ExecutionContext::new();

    mock.reply(
        "/v1/chat/completions",
        Reply::Json(
            StatusCode::UNAUTHORIZED,
            json!({"error": {"message": "Incorrect API key provided", "type": "invalid_request_error",
                "param": null, "code": "invalid_api_key"}}),
        ),
    );
    let err = provider.chat(&hello(), &ctx).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ProviderApi);
    assert_eq!(err.status, Some(StatusCode::UNAUTHORIZED));
    assert_eq!(err.code.as_deref(), Some("invalid_api_key"));
    assert_eq!(err.param, None);
    assert_eq!(err.origin.provider, "mock");
    assert_eq!(err.origin.model, "mock/gpt-4o-mini");
    assert!(!err.is_retryable());

    mock.reply(
        "/v1/chat/completions",
        Reply::Json(StatusCode::TOO_MANY_REQUESTS, json!({"error": {"message": "Rate limit reached"}})),
    );
    let err = provider.chat(&hello(), &ctx).await.unwrap_err();
    assert_eq!(err.message, "Rate limit reached");
    assert!(err.is_retryable());

    mock.reply("/v1/chat/completions", Reply::Status(StatusCode::BAD_GATEWAY, "upstream went away"));
    let err = provider.chat(&hello(), &ctx).await.unwrap_err();
    assert_eq!(err.message, "upstream went away");
    assert_eq!(err.status, Some(StatusCode::BAD_GATEWAY));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn error_payload_with_success_status_is_an_error() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply(
        "/v1/chat/completions",
        Reply::Json(StatusCode::OK, json!({"error": {"message": "model is loading", "code": 503}})),
    );

    let err = provider(&mock).chat(&hello(), &ExecutionContext::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ProviderApi);
    assert_eq!(err.message, "model is loading");
    assert_eq!(err.code.as_deref(), Some("503"));
}

#[tokio::test]
async fn garbage_body_is_a_decode_error() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply(
        "/v1/chat/completions",
        Reply::Sized {
            content_type: "application/json",
            body: b"{\"id\": ".to_vec(),
        },
    );

    let err = provider(&mock).chat(&hello(), &ExecutionContext::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Decode);
}

#[tokio::test]
async fn disallowed_request_never_reaches_upstream() {
    let mock = MockUpstream::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_provider("mock", ProviderKind::OpenAi, &mock.v1())
        .allowing(&[RequestKind::ListModels])
        .build();
    let provider = HttpProvider::new("mock", config.provider("mock").unwrap()).unwrap();

    let err = provider.chat_stream(&hello(), &ExecutionContext::new()).await.err().unwrap();
    assert_eq!(err.kind, ErrorKind::OperationDisallowed);
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn models_are_prefixed_with_provider_name() {
    let mock = MockUpstream::start().await.unwrap();
    mock.reply(
        "/v1/models",
        Reply::Json(
            StatusCode::OK,
            json!({"object": "list", "data": [
                {"id": "gpt-4o", "object": "model", "created": 1_715_367_049, "owned_by": "system"},
                {"id": "text-embedding-3-small", "object": "model", "created": 1_705_948_997, "owned_by": "system"}
            ]}),
        ),
    );

    let models = provider(&mock).list_models(&ExecutionContext::new()).await.unwrap();
    let ids: Vec<_> = models.data.iter().map(|model| model.id.as_str()).collect();
    assert_eq!(ids, ["mock/gpt-4o", "mock/text-embedding-3-small"]);
    assert_eq!(mock.last_request().path, "/v1/models");
}
