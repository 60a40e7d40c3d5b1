#![allow(dead_code)]

pub mod config;
pub mod mock_upstream;

use futures_util::StreamExt;
use prism_core::CanonicalError;
use prism_llm::{EventStream, StreamEvent};

/// Read a stream to its end
pub async fn drain(mut events: EventStream) -> Vec<Result<StreamEvent, CanonicalError>> {
    let mut out = Vec::new();
    while let Some(event) = events.next().await {
        out.push(event);
    }
    out
}

/// Events of a stream that must not fail
pub fn ok_events(results: Vec<Result<StreamEvent, CanonicalError>>) -> Vec<StreamEvent> {
    results
        .into_iter()
        .map(|event| event.expect("stream event"))
        .collect()
}

/// Chunk indices are 0..n and only the last event is terminal
pub fn assert_well_formed(events: &[StreamEvent]) {
    for (position, event) in events.iter().enumerate() {
        assert_eq!(event.chunk_index, position as u64);
        assert_eq!(event.is_terminal, position + 1 == events.len(), "event {position}");
    }
}

pub fn text_of(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|event| event.delta.content.as_deref())
        .collect()
}
