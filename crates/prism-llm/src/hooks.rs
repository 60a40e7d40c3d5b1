//! Post-processing hooks run on everything a provider returns

use std::fmt;
use std::sync::Arc;

use prism_core::CanonicalError;

use crate::types::{ChatResponse, StreamEvent};

/// Observer or rewriter for provider output
///
/// Every method defaults to passing its input through unchanged.
pub trait PostHook: Send + Sync {
    /// Rewrite a stream event, or drop it by returning `None`
    ///
    /// Chunk indices are reassigned after hooks run, so changing
    /// `chunk_index` here has no effect.
    fn process(&self, event: StreamEvent) -> Option<StreamEvent> {
        Some(event)
    }

    fn process_response(&self, response: ChatResponse) -> ChatResponse {
        response
    }

    fn process_error(&self, error: CanonicalError) -> CanonicalError {
        error
    }
}

/// Hooks in registration order
#[derive(Clone, Default)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn PostHook>>,
}

impl fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookPipeline").field("hooks", &self.hooks.len()).finish()
    }
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: Arc<dyn PostHook>) {
        self.hooks.push(hook);
    }

    #[must_use]
    pub fn with(mut self, hook: Arc<dyn PostHook>) -> Self {
        self.push(hook);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook, stopping at the first one that drops the event
    pub fn process(&self, event: StreamEvent) -> Option<StreamEvent> {
        self.hooks.iter().try_fold(event, |event, hook| hook.process(event))
    }

    pub fn process_response(&self, response: ChatResponse) -> ChatResponse {
        self.hooks
            .iter()
            .fold(response, |response, hook| hook.process_response(response))
    }

    pub fn process_error(&self, error: CanonicalError) -> CanonicalError {
        self.hooks.iter().fold(error, |error, hook| hook.process_error(error))
    }
}
