//! Streaming normalization
//!
//! A provider stream is read as a sequence of text lines, each line is decoded
//! into a [`ChunkUpdate`] by the adapter's stream decoder, and the normalizer
//! turns those updates into indexed [`StreamEvent`](crate::types::StreamEvent)s
//! on a bounded channel.

pub mod lines;
pub mod normalizer;

pub use lines::{LineStream, ndjson_lines, sse_lines};
pub use normalizer::{EventStream, NormalizerOptions, normalize};

use crate::types::{Delta, FinishReason, Usage};

/// What one upstream chunk contributes to the stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkUpdate {
    /// Upstream message id, kept from the first chunk that has one
    pub id: Option<String>,
    pub model: Option<String>,
    pub delta: Delta,
    /// Partial or complete usage, merged by the normalizer
    pub usage: Option<Usage>,
    pub finish_reason: Option<FinishReason>,
    /// The provider signalled the end of the stream in-band
    pub done: bool,
}

impl ChunkUpdate {
    pub fn delta(delta: Delta) -> Self {
        Self {
            delta,
            ..Self::default()
        }
    }
}
