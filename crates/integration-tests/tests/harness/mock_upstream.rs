//! Mock upstream server for integration tests
//!
//! Serves canned replies keyed by request path and records every request it
//! receives.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

/// Canned reply for one path
#[derive(Clone)]
pub enum Reply {
    Json(StatusCode, serde_json::Value),
    /// Each payload is sent as its own `data:` event in its own chunk
    Sse(Vec<String>),
    /// Raw SSE text, sent as-is
    SseText(String),
    /// One JSON object per line, each line in its own chunk
    Ndjson(Vec<serde_json::Value>),
    /// Body with a known length
    Sized { content_type: &'static str, body: Vec<u8> },
    /// Body without `Content-Length`, sent in the given pieces
    Chunked { content_type: &'static str, chunks: Vec<Vec<u8>> },
    /// SSE events followed by a connection that never sends again
    Stall(Vec<String>),
    Status(StatusCode, &'static str),
}

/// A request as the mock saw it
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Captured {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Default)]
struct MockState {
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<Captured>>,
}

pub struct MockUpstream {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockUpstream {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState::default());

        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Register the reply for a path, replacing any earlier one
    pub fn reply(&self, path: &str, reply: Reply) -> &Self {
        self.state.replies.lock().unwrap().insert(path.to_owned(), reply);
        self
    }

    /// Root URL without a version prefix
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Base URL for `OpenAI`-shaped providers
    pub fn v1(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Captured {
        self.requests().pop().expect("mock received a request")
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_owned();
    state.requests.lock().unwrap().push(Captured {
        method,
        path: path.clone(),
        query: uri.query().map(str::to_owned),
        headers,
        body,
    });

    let reply = state.replies.lock().unwrap().get(&path).cloned();
    match reply {
        Some(reply) => render(reply),
        None => (StatusCode::NOT_FOUND, format!("no reply for {path}")).into_response(),
    }
}

fn chunked(content_type: &'static str, chunks: Vec<Vec<u8>>) -> Response {
    let body = stream::iter(chunks.into_iter().map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk))));
    ([(header::CONTENT_TYPE, content_type)], Body::from_stream(body)).into_response()
}

fn sse_events(events: Vec<String>) -> Vec<Vec<u8>> {
    events
        .into_iter()
        .map(|event| format!("data: {event}\n\n").into_bytes())
        .collect()
}

fn render(reply: Reply) -> Response {
    match reply {
        Reply::Json(status, value) => (status, axum::Json(value)).into_response(),
        Reply::Sse(events) => chunked("text/event-stream", sse_events(events)),
        Reply::SseText(text) => chunked("text/event-stream", vec![text.into_bytes()]),
        Reply::Ndjson(lines) => chunked(
            "application/x-ndjson",
            lines.into_iter().map(|line| format!("{line}\n").into_bytes()).collect(),
        ),
        Reply::Sized { content_type, body } => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Reply::Chunked { content_type, chunks } => chunked(content_type, chunks),
        Reply::Stall(events) => {
            let body = stream::iter(
                sse_events(events)
                    .into_iter()
                    .map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk))),
            )
            .chain(stream::pending());
            ([(header::CONTENT_TYPE, "text/event-stream")], Body::from_stream(body)).into_response()
        }
        Reply::Status(status, text) => (status, text).into_response(),
    }
}
