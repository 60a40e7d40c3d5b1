//! Turns provider stream lines into canonical stream events
//!
//! One spawned task per stream owns every piece of mutable state (decoder,
//! usage, chunk index) and talks to the caller through a bounded channel.
//! Whatever the exit path, the task marks the stream ended on the context
//! and sends nothing afterwards. The last item sent is always the terminal
//! event or an error, unless the caller stopped listening.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use prism_core::context::interruption_error;
use prism_core::{Attribution, CanonicalError, ExecutionContext};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::ChunkUpdate;
use super::lines::LineStream;
use crate::adapter::{ProviderAdapter, StreamDecoder};
use crate::hooks::HookPipeline;
use crate::types::{Delta, FinishReason, StreamEvent};
use crate::usage::UsageAccumulator;

/// Canonical events as the caller receives them
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, CanonicalError>> + Send>>;

/// SSE fields other than `data` that may reach the normalizer unparsed
const SSE_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizerOptions {
    /// Channel capacity between the worker and the caller
    pub buffer_size: usize,
    /// Attach the upstream JSON text to each event
    pub send_back_raw: bool,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            buffer_size: 64,
            send_back_raw: false,
        }
    }
}

/// Spawn the worker for one stream and return its receiving end
///
/// Dropping the returned stream stops the worker at its next send.
pub fn normalize(
    lines: LineStream,
    adapter: ProviderAdapter,
    ctx: ExecutionContext,
    origin: Attribution,
    hooks: HookPipeline,
    options: NormalizerOptions,
) -> EventStream {
    let (tx, rx) = mpsc::channel(options.buffer_size.max(1));

    let worker = Worker {
        session: Session::new(adapter, origin.clone(), options.send_back_raw),
        ctx,
        origin,
        hooks,
        tx,
    };
    tokio::spawn(worker.run(lines));

    Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}

/// Outcome of one upstream line
#[derive(Debug)]
enum Step {
    Skip,
    Emit(StreamEvent),
    /// In-band end of stream, with whatever the final chunk carried
    Done { delta: Delta, raw: Option<String> },
    Fail(CanonicalError),
}

/// Per-stream state, touched only by the worker
struct Session {
    adapter: ProviderAdapter,
    decoder: StreamDecoder,
    origin: Attribution,
    send_back_raw: bool,
    id: Option<String>,
    model: String,
    usage: UsageAccumulator,
    finish_reason: Option<FinishReason>,
    role_sent: bool,
    next_index: u64,
    started: Instant,
    last_emit: Instant,
}

impl Session {
    fn new(adapter: ProviderAdapter, origin: Attribution, send_back_raw: bool) -> Self {
        let now = Instant::now();
        Self {
            adapter,
            decoder: adapter.stream_decoder(),
            model: origin.model.clone(),
            origin,
            send_back_raw,
            id: None,
            usage: UsageAccumulator::new(),
            finish_reason: None,
            role_sent: false,
            next_index: 0,
            started: now,
            last_emit: now,
        }
    }

    fn line(&mut self, line: &str) -> Step {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(':') {
            return Step::Skip;
        }

        let payload = trimmed.strip_prefix("data:").map_or(trimmed, str::trim_start);
        if payload == "[DONE]" {
            return Step::Done {
                delta: Delta::default(),
                raw: None,
            };
        }
        if SSE_FIELDS.iter().any(|field| payload.starts_with(field)) {
            return Step::Skip;
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(provider = %self.origin.provider, error = %e, "skipping malformed stream line");
                return Step::Skip;
            }
        };

        if let Some(error) = self.adapter.upstream_error(&value) {
            tracing::warn!(provider = %self.origin.provider, message = %error.message, "upstream error mid-stream");
            return Step::Fail(error.into_canonical(None, self.origin.clone()));
        }

        let update = match self.decoder.decode(value) {
            Ok(update) => update,
            Err(e) => {
                tracing::debug!(provider = %self.origin.provider, error = %e, "skipping unrecognized stream payload");
                return Step::Skip;
            }
        };

        let raw = self.send_back_raw.then(|| payload.to_owned());
        self.absorb(update, raw)
    }

    fn absorb(&mut self, update: ChunkUpdate, raw: Option<String>) -> Step {
        if self.id.is_none() {
            self.id = update.id;
        }
        if let Some(model) = update.model.filter(|m| !m.is_empty()) {
            self.model = model;
        }
        if let Some(usage) = &update.usage {
            self.usage.add(usage);
        }
        if update.finish_reason.is_some() {
            self.finish_reason = update.finish_reason;
        }

        let mut delta = update.delta;
        if delta.role.is_some() {
            if self.role_sent {
                delta.role = None;
            } else {
                self.role_sent = true;
            }
        }

        if update.done {
            return Step::Done { delta, raw };
        }
        if delta.is_empty() {
            return Step::Skip;
        }

        Step::Emit(self.event(delta, raw, false))
    }

    /// Event without its final index, which is assigned at delivery
    fn event(&self, delta: Delta, raw: Option<String>, is_terminal: bool) -> StreamEvent {
        let since = if is_terminal { self.started } else { self.last_emit };

        StreamEvent {
            id: self.id.clone(),
            model: self.model.clone(),
            chunk_index: self.next_index,
            delta,
            finish_reason: if is_terminal { self.finish_reason.clone() } else { None },
            usage: if is_terminal { self.usage.get() } else { None },
            is_terminal,
            latency_ms: elapsed_ms(since),
            raw,
        }
    }

    fn terminal(&self, delta: Delta, raw: Option<String>) -> StreamEvent {
        self.event(delta, raw, true)
    }

    fn assign_index(&mut self, event: &mut StreamEvent) {
        event.chunk_index = self.next_index;
        self.next_index += 1;
        self.last_emit = Instant::now();
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

struct Worker {
    session: Session,
    ctx: ExecutionContext,
    origin: Attribution,
    hooks: HookPipeline,
    tx: mpsc::Sender<Result<StreamEvent, CanonicalError>>,
}

/// Whether the worker should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

impl Worker {
    async fn run(mut self, mut lines: LineStream) {
        let (delta, raw) = loop {
            if let Some(kind) = self.ctx.interruption() {
                self.fail(interruption_error(kind, self.origin.clone())).await;
                return;
            }

            let next = tokio::select! {
                biased;
                kind = self.ctx.interrupted() => Err(kind),
                next = lines.next() => Ok(next),
            };

            let line = match next {
                Err(kind) => {
                    self.fail(interruption_error(kind, self.origin.clone())).await;
                    return;
                }
                // Upstream closed without an in-band end marker
                Ok(None) => break (Delta::default(), None),
                Ok(Some(Ok(line))) => line,
                Ok(Some(Err(error))) => {
                    self.fail(error).await;
                    return;
                }
            };

            match self.session.line(&line) {
                Step::Skip => {}
                Step::Emit(event) => {
                    if self.emit(event).await == Flow::Stop {
                        return;
                    }
                }
                Step::Done { delta, raw } => break (delta, raw),
                Step::Fail(error) => {
                    self.fail(error).await;
                    return;
                }
            }
        };

        self.finish(delta, raw).await;
    }

    /// Run hooks and deliver a non-terminal event
    ///
    /// An interruption while the channel is full is reported in place of the
    /// event.
    async fn emit(&mut self, event: StreamEvent) -> Flow {
        let Some(mut event) = self.hooks.process(event) else {
            return Flow::Continue;
        };
        self.session.assign_index(&mut event);

        tokio::select! {
            biased;
            sent = self.tx.send(Ok(event)) => {
                if sent.is_ok() {
                    return Flow::Continue;
                }
                self.receiver_gone();
            }
            kind = self.ctx.interrupted() => {
                self.fail(interruption_error(kind, self.origin.clone())).await;
            }
        }
        Flow::Stop
    }

    /// Deliver the terminal event, which hooks may rewrite but not drop
    async fn finish(&mut self, delta: Delta, raw: Option<String>) {
        let terminal = self.session.terminal(delta, raw);
        let mut event = self.hooks.process(terminal.clone()).unwrap_or(terminal);
        event.is_terminal = true;
        self.session.assign_index(&mut event);

        tracing::debug!(
            provider = %self.origin.provider,
            model = %event.model,
            chunks = event.chunk_index + 1,
            latency_ms = event.latency_ms,
            "stream finished"
        );

        self.deliver_last(Ok(event)).await;
    }

    async fn fail(&self, error: CanonicalError) {
        let error = self.hooks.process_error(error);
        self.deliver_last(Err(error)).await;
    }

    /// Send the item that ends the stream
    ///
    /// Waits for room however long the caller takes, and only gives up once
    /// the receiver is dropped.
    async fn deliver_last(&self, item: Result<StreamEvent, CanonicalError>) {
        if self.tx.send(item).await.is_err() {
            self.receiver_gone();
        }
        self.ctx.mark_stream_ended();
    }

    fn receiver_gone(&self) {
        tracing::debug!(provider = %self.origin.provider, "stream receiver gone");
        self.ctx.mark_stream_ended();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::stream;
    use prism_core::{ErrorKind, RequestKind};

    use super::*;
    use crate::hooks::PostHook;
    use crate::types::{Role, Usage};

    fn origin() -> Attribution {
        Attribution::new("local", "gpt-test", RequestKind::ChatStream)
    }

    fn lines(items: &[&str]) -> LineStream {
        let items: Vec<Result<String, CanonicalError>> = items.iter().map(|line| Ok((*line).to_owned())).collect();
        Box::pin(stream::iter(items))
    }

    fn openai_chunk(content: &str) -> String {
        format!(r#"data: {{"id":"c1","model":"gpt-test","choices":[{{"index":0,"delta":{{"content":"{content}"}}}}]}}"#)
    }

    async fn collect(stream: EventStream) -> Vec<Result<StreamEvent, CanonicalError>> {
        stream.collect().await
    }

    fn run(items: &[&str], adapter: ProviderAdapter, ctx: &ExecutionContext) -> EventStream {
        normalize(
            lines(items),
            adapter,
            ctx.clone(),
            origin(),
            HookPipeline::new(),
            NormalizerOptions::default(),
        )
    }

    #[tokio::test]
    async fn indices_are_dense_and_terminal_is_last() {
        let ctx = ExecutionContext::new();
        let (a, b) = (openai_chunk("Hel"), openai_chunk("lo"));
        let events = collect(run(&[&a, "", ": comment", &b, "data: [DONE]"], ProviderAdapter::OpenAi, &ctx)).await;

        let events: Vec<StreamEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events.iter().map(|e| e.chunk_index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(events[0].delta.content.as_deref(), Some("Hel"));
        assert_eq!(events[0].id.as_deref(), Some("c1"));
        assert!(events[2].is_terminal);
        assert!(events[..2].iter().all(|e| !e.is_terminal && e.usage.is_none()));
        assert!(ctx.is_stream_ended());
    }

    #[tokio::test]
    async fn malformed_line_does_not_end_the_stream() {
        let ctx = ExecutionContext::new();
        let (a, b) = (openai_chunk("a"), openai_chunk("b"));
        let events = collect(run(&[&a, "data: {not json", &b, "data: [DONE]"], ProviderAdapter::OpenAi, &ctx)).await;

        let text: String = events
            .iter()
            .filter_map(|e| e.as_ref().ok()?.delta.content.clone())
            .collect();
        assert_eq!(text, "ab");
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn usage_merges_across_chunks() {
        let ctx = ExecutionContext::new();
        let (a, b) = (openai_chunk("a"), openai_chunk("b"));
        let events = collect(run(
            &[
                r#"data: {"id":"c1","model":"gpt-test","choices":[{"index":0,"delta":{"role":"assistant","content":"x"}}],"usage":{"prompt_tokens":10,"completion_tokens":3,"total_tokens":13}}"#,
                &a,
                &b,
                r#"data: {"id":"c1","model":"gpt-test","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
                r#"data: {"id":"c1","model":"gpt-test","choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
                "data: [DONE]",
            ],
            ProviderAdapter::OpenAi,
            &ctx,
        ))
        .await;

        assert_eq!(events.len(), 4);
        let terminal = events.last().unwrap().as_ref().unwrap();
        assert!(terminal.is_terminal);
        assert_eq!(terminal.chunk_index, 3);
        assert_eq!(terminal.usage, Some(Usage::new(10, 5)));
        assert_eq!(terminal.usage.map(|u| u.total_tokens), Some(15));
        assert_eq!(terminal.finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn ndjson_done_line_carries_usage() {
        let ctx = ExecutionContext::new();
        let events = collect(run(
            &[
                r#"{"model":"llama3","message":{"role":"assistant","content":"a"},"done":false}"#,
                r#"{"model":"llama3","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop","prompt_eval_count":10,"eval_count":5}"#,
            ],
            ProviderAdapter::Ollama,
            &ctx,
        ))
        .await;

        let terminal = events.last().unwrap().as_ref().unwrap();
        assert_eq!(terminal.chunk_index, 1);
        assert_eq!(terminal.usage, Some(Usage::new(10, 5)));
        assert_eq!(terminal.model, "llama3");
    }

    #[tokio::test]
    async fn role_is_only_sent_once() {
        let ctx = ExecutionContext::new();
        let events = collect(run(
            &[
                r#"{"model":"m","message":{"role":"assistant","content":"a"},"done":false}"#,
                r#"{"model":"m","message":{"role":"assistant","content":"b"},"done":false}"#,
                r#"{"model":"m","done":true}"#,
            ],
            ProviderAdapter::Ollama,
            &ctx,
        ))
        .await;

        let roles: Vec<Option<Role>> = events.iter().map(|e| e.as_ref().unwrap().delta.role).collect();
        assert_eq!(roles, vec![Some(Role::Assistant), None, None]);
    }

    #[tokio::test]
    async fn mid_stream_error_ends_the_stream() {
        let ctx = ExecutionContext::new();
        let a = openai_chunk("a");
        let events = collect(run(
            &[&a, r#"data: {"error":{"message":"overloaded","type":"server_error"}}"#, &openai_chunk("b")],
            ProviderAdapter::OpenAi,
            &ctx,
        ))
        .await;

        assert_eq!(events.len(), 2);
        let error = events[1].as_ref().unwrap_err();
        assert_eq!(error.kind, ErrorKind::ProviderApi);
        assert_eq!(error.message, "overloaded");
        assert_eq!(error.origin, origin());
        assert!(ctx.is_stream_ended());
    }

    #[tokio::test]
    async fn end_of_body_without_marker_still_terminates() {
        let ctx = ExecutionContext::new();
        let events = collect(run(
            &[r#"data: {"candidates":[{"content":{"role":"model","parts":[{"text":"hi"}]},"finishReason":"STOP"}]}"#],
            ProviderAdapter::Google,
            &ctx,
        ))
        .await;

        assert_eq!(events.len(), 2);
        let terminal = events[1].as_ref().unwrap();
        assert!(terminal.is_terminal);
        assert_eq!(terminal.finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn raw_payload_is_attached_on_request() {
        let ctx = ExecutionContext::new();
        let chunk = openai_chunk("a");
        let stream = normalize(
            lines(&[&chunk, "data: [DONE]"]),
            ProviderAdapter::OpenAi,
            ctx,
            origin(),
            HookPipeline::new(),
            NormalizerOptions {
                buffer_size: 1,
                send_back_raw: true,
            },
        );

        let events = collect(stream).await;
        let first = events[0].as_ref().unwrap();
        assert_eq!(first.raw.as_deref(), chunk.strip_prefix("data: "));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_a_stalled_stream() {
        let ctx = ExecutionContext::new();
        let first = openai_chunk("a");
        let items: Vec<Result<String, CanonicalError>> = vec![Ok(first)];
        let stalled: LineStream = Box::pin(stream::iter(items).chain(stream::pending()));

        let mut events = normalize(
            stalled,
            ProviderAdapter::OpenAi,
            ctx.clone(),
            origin(),
            HookPipeline::new(),
            NormalizerOptions::default(),
        );

        assert!(events.next().await.unwrap().is_ok());
        ctx.cancel();

        let error = events.next().await.unwrap().unwrap_err();
        assert_eq!(error.kind, ErrorKind::Cancelled);
        assert!(events.next().await.is_none());
        assert!(ctx.is_stream_ended());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_surfaces_as_timeout() {
        let ctx = ExecutionContext::new().with_timeout(Duration::from_secs(1));
        let stalled: LineStream = Box::pin(stream::pending());

        let events = collect(normalize(
            stalled,
            ProviderAdapter::Ollama,
            ctx,
            origin(),
            HookPipeline::new(),
            NormalizerOptions::default(),
        ))
        .await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap_err().kind, ErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reaches_a_slow_consumer() {
        let ctx = ExecutionContext::new().with_timeout(Duration::from_secs(1));
        let items: Vec<Result<String, CanonicalError>> =
            ["a", "b", "c"].iter().map(|content| Ok(openai_chunk(content))).collect();
        let stalled: LineStream = Box::pin(stream::iter(items).chain(stream::pending()));

        let stream = normalize(
            stalled,
            ProviderAdapter::OpenAi,
            ctx.clone(),
            origin(),
            HookPipeline::new(),
            NormalizerOptions {
                buffer_size: 1,
                send_back_raw: false,
            },
        );
        tokio::time::sleep(Duration::from_secs(2)).await;

        let events = collect(stream).await;
        let error = events.last().unwrap().as_ref().unwrap_err();
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert!(events[..events.len() - 1].iter().all(Result::is_ok));
        assert!(ctx.is_stream_ended());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_reaches_a_full_channel() {
        let ctx = ExecutionContext::new();
        let stalled: LineStream = Box::pin(stream::repeat_with(|| Ok(openai_chunk("x"))));

        let mut events = normalize(
            stalled,
            ProviderAdapter::OpenAi,
            ctx.clone(),
            origin(),
            HookPipeline::new(),
            NormalizerOptions {
                buffer_size: 1,
                send_back_raw: false,
            },
        );
        assert!(events.next().await.unwrap().is_ok());
        ctx.cancel();

        let mut last = None;
        while let Some(event) = events.next().await {
            last = Some(event);
        }
        assert_eq!(last.unwrap().unwrap_err().kind, ErrorKind::Cancelled);
    }

    struct DropEverything;

    impl PostHook for DropEverything {
        fn process(&self, _event: StreamEvent) -> Option<StreamEvent> {
            None
        }
    }

    struct DropContaining(&'static str);

    impl PostHook for DropContaining {
        fn process(&self, event: StreamEvent) -> Option<StreamEvent> {
            (event.delta.content.as_deref() != Some(self.0)).then_some(event)
        }
    }

    #[tokio::test]
    async fn dropped_events_do_not_consume_indices() {
        let ctx = ExecutionContext::new();
        let (a, b, c) = (openai_chunk("a"), openai_chunk("b"), openai_chunk("c"));
        let stream = normalize(
            lines(&[&a, &b, &c, "data: [DONE]"]),
            ProviderAdapter::OpenAi,
            ctx,
            origin(),
            HookPipeline::new().with(Arc::new(DropContaining("b"))),
            NormalizerOptions::default(),
        );

        let events: Vec<StreamEvent> = collect(stream).await.into_iter().map(Result::unwrap).collect();
        let contents: Vec<Option<&str>> = events.iter().map(|e| e.delta.content.as_deref()).collect();
        assert_eq!(contents, vec![Some("a"), Some("c"), None]);
        assert_eq!(events.iter().map(|e| e.chunk_index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn terminal_survives_a_dropping_hook() {
        let ctx = ExecutionContext::new();
        let a = openai_chunk("a");
        let stream = normalize(
            lines(&[&a, "data: [DONE]"]),
            ProviderAdapter::OpenAi,
            ctx,
            origin(),
            HookPipeline::new().with(Arc::new(DropEverything)),
            NormalizerOptions::default(),
        );

        let events = collect(stream).await;
        assert_eq!(events.len(), 1);
        let terminal = events[0].as_ref().unwrap();
        assert!(terminal.is_terminal);
        assert_eq!(terminal.chunk_index, 0);
    }

    #[tokio::test]
    async fn dropped_receiver_ends_the_worker() {
        let ctx = ExecutionContext::new();
        let stalled: LineStream = Box::pin(stream::repeat_with(|| Ok(openai_chunk("x"))));

        let mut events = normalize(
            stalled,
            ProviderAdapter::OpenAi,
            ctx.clone(),
            origin(),
            HookPipeline::new(),
            NormalizerOptions {
                buffer_size: 1,
                send_back_raw: false,
            },
        );
        assert!(events.next().await.unwrap().is_ok());
        drop(events);

        for _ in 0..100 {
            if ctx.is_stream_ended() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(ctx.is_stream_ended());
    }
}
