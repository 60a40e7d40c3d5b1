//! Usage accumulation across streamed chunks
//!
//! Providers report usage early with partial figures, again at the end, or
//! never report a total. Every figure is merged with `max` so the result does
//! not depend on order or on repeats.

use crate::types::{CompletionTokensDetails, PromptTokensDetails, Usage};

/// Running usage for one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageAccumulator {
    merged: Option<Usage>,
}

impl UsageAccumulator {
    pub const fn new() -> Self {
        Self { merged: None }
    }

    /// Fold one report into the running total
    pub fn add(&mut self, usage: &Usage) {
        let current = self.merged.unwrap_or_default();

        let prompt_tokens = current.prompt_tokens.max(usage.prompt_tokens);
        let completion_tokens = current.completion_tokens.max(usage.completion_tokens);
        let total_tokens = current
            .total_tokens
            .max(usage.total_tokens)
            .max(prompt_tokens + completion_tokens);

        self.merged = Some(Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            prompt_tokens_details: merge_prompt_details(current.prompt_tokens_details, usage.prompt_tokens_details),
            completion_tokens_details: merge_completion_details(
                current.completion_tokens_details,
                usage.completion_tokens_details,
            ),
        });
    }

    pub const fn is_empty(&self) -> bool {
        self.merged.is_none()
    }

    /// Merged usage, `None` when nothing was ever reported
    pub const fn get(&self) -> Option<Usage> {
        self.merged
    }
}

fn max_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn merge_prompt_details(a: Option<PromptTokensDetails>, b: Option<PromptTokensDetails>) -> Option<PromptTokensDetails> {
    match (a, b) {
        (Some(a), Some(b)) => Some(PromptTokensDetails {
            cached_tokens: max_opt(a.cached_tokens, b.cached_tokens),
            audio_tokens: max_opt(a.audio_tokens, b.audio_tokens),
        }),
        (a, b) => a.or(b),
    }
}

fn merge_completion_details(
    a: Option<CompletionTokensDetails>,
    b: Option<CompletionTokensDetails>,
) -> Option<CompletionTokensDetails> {
    match (a, b) {
        (Some(a), Some(b)) => Some(CompletionTokensDetails {
            reasoning_tokens: max_opt(a.reasoning_tokens, b.reasoning_tokens),
            audio_tokens: max_opt(a.audio_tokens, b.audio_tokens),
        }),
        (a, b) => a.or(b),
    }
}
