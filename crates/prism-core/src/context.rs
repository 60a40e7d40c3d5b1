use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use http::HeaderMap;
use secrecy::SecretString;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Attribution, CanonicalError, ErrorKind};

/// Default number of bytes read ahead for large-payload usage extraction
pub const DEFAULT_PREFETCH_SIZE: usize = 64 * 1024;

/// Upper bound on the usage preview window regardless of configuration
pub const MAX_PREVIEW_SIZE: usize = 1024 * 1024;

/// Large-payload passthrough settings for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LargePayloadOptions {
    /// Bodies larger than this many bytes are streamed to the caller
    pub threshold: usize,
    /// Bytes read ahead to look for usage
    pub prefetch_size: usize,
}

impl LargePayloadOptions {
    pub const fn new(threshold: usize) -> Self {
        Self {
            threshold,
            prefetch_size: DEFAULT_PREFETCH_SIZE,
        }
    }

    /// Effective preview window, capped at [`MAX_PREVIEW_SIZE`]
    pub fn preview_size(&self) -> usize {
        self.prefetch_size.clamp(1, MAX_PREVIEW_SIZE)
    }
}

/// Per-request execution state passed by reference through a provider call
///
/// Every flag a provider or the stream normalizer may consult lives here as
/// a named field.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Caller-supplied key that overrides the configured one
    pub api_key: Option<SecretString>,
    /// Headers added to every upstream request
    pub extra_headers: HeaderMap,
    /// Attach upstream JSON text to responses and stream events
    pub send_back_raw_response: bool,
    /// Passthrough mode for oversized bodies, `None` disables it
    pub large_payload: Option<LargePayloadOptions>,
    /// Chat call made on behalf of a Responses API request
    pub responses_fallback: bool,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
    stream_ended: Arc<AtomicBool>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            api_key: None,
            extra_headers: HeaderMap::new(),
            send_back_raw_response: false,
            large_payload: None,
            responses_fallback: false,
            cancellation: CancellationToken::new(),
            deadline: None,
            stream_ended: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Tie this request to an outer cancellation token
    ///
    /// Cancelling the parent cancels the request; cancelling the request
    /// leaves the parent untouched.
    #[must_use]
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancellation = parent.child_token();
        self
    }

    /// Fail the request once `timeout` has elapsed from now
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<SecretString>) -> Self {
        self.api_key = api_key;
        self
    }

    #[must_use]
    pub const fn with_large_payload(mut self, options: Option<LargePayloadOptions>) -> Self {
        self.large_payload = options;
        self
    }

    #[must_use]
    pub const fn with_raw_response(mut self, enabled: bool) -> Self {
        self.send_back_raw_response = enabled;
        self
    }

    #[must_use]
    pub const fn with_responses_fallback(mut self, enabled: bool) -> Self {
        self.responses_fallback = enabled;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Cancel the request from the caller side
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Immediate, non-blocking check for cancellation or an elapsed deadline
    ///
    /// Cancellation wins when both apply.
    pub fn interruption(&self) -> Option<ErrorKind> {
        if self.cancellation.is_cancelled() {
            return Some(ErrorKind::Cancelled);
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ErrorKind::Timeout),
            _ => None,
        }
    }

    /// Resolves once the request is cancelled or its deadline passes
    pub async fn interrupted(&self) -> ErrorKind {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                () = self.cancellation.cancelled() => ErrorKind::Cancelled,
                () = tokio::time::sleep_until(deadline) => ErrorKind::Timeout,
            },
            None => {
                self.cancellation.cancelled().await;
                ErrorKind::Cancelled
            }
        }
    }

    /// Turn [`Self::interruption`] into an attributed error
    pub fn check(&self, origin: &Attribution) -> Result<(), CanonicalError> {
        match self.interruption() {
            Some(kind) => Err(interruption_error(kind, origin.clone())),
            None => Ok(()),
        }
    }

    /// Record that the stream for this request has ended
    pub fn mark_stream_ended(&self) {
        self.stream_ended.store(true, Ordering::Release);
    }

    pub fn is_stream_ended(&self) -> bool {
        self.stream_ended.load(Ordering::Acquire)
    }
}

/// Error for an interruption kind returned by [`ExecutionContext::interrupted`]
pub fn interruption_error(kind: ErrorKind, origin: Attribution) -> CanonicalError {
    match kind {
        ErrorKind::Timeout => CanonicalError::timeout(origin),
        _ => CanonicalError::cancelled(origin),
    }
}
