//! Conversion between the canonical model and each provider's wire format
//!
//! Every submodule exposes the same trio: `to_request` (canonical request to
//! wire request, `None` when there is nothing to send), `to_response` (wire
//! response to canonical response) and a stream state that turns one wire
//! chunk into a [`ChunkUpdate`](crate::stream::ChunkUpdate).

pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

use crate::reasoning;
use crate::types::{Message, ToolCall, Usage};
use crate::usage::UsageAccumulator;

/// Key that carries tool arguments which were not a JSON object
pub const RAW_ARGUMENTS_KEY: &str = "_raw_arguments";

/// Current Unix time in seconds, used when a provider omits a timestamp
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// Unix seconds of an RFC 3339 timestamp, `None` when it does not parse
/// or predates the epoch
pub(crate) fn unix_seconds(timestamp: &str) -> Option<u64> {
    let timestamp: jiff::Timestamp = timestamp.parse().ok()?;
    u64::try_from(timestamp.as_second()).ok()
}

/// Message as it may be sent upstream
///
/// Assistant turns that still carry stashed reasoning get it lifted back
/// out so a placeholder call never reaches a provider.
pub(crate) fn outbound(message: &Message) -> Cow<'_, Message> {
    let needs_lift = message
        .tool_calls()
        .iter()
        .any(|call| call.extra_content.is_some() || reasoning::is_placeholder(call));

    if !needs_lift {
        return Cow::Borrowed(message);
    }

    let mut owned = message.clone();
    if let Some(extension) = owned.assistant.as_mut() {
        reasoning::lift(extension);
    }
    Cow::Owned(owned)
}

/// Run a single usage report through the accumulator
///
/// Fills in a missing or short total the same way streamed usage does.
pub(crate) fn settle_usage(usage: &Usage) -> Option<Usage> {
    let mut accumulator = UsageAccumulator::new();
    accumulator.add(usage);
    accumulator.get()
}

/// Tool-call arguments as a JSON object for providers that need one
///
/// Empty arguments become `{}`. Anything that is not an object travels
/// under [`RAW_ARGUMENTS_KEY`] instead of failing the conversion.
pub(crate) fn arguments_object(call: &ToolCall) -> Map<String, Value> {
    let raw = call.function.arguments.trim();
    if raw.is_empty() {
        return Map::new();
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => {
            tracing::debug!(
                function = call.function.name.as_deref().unwrap_or_default(),
                "tool call arguments are not a JSON object, passing them through raw"
            );
            let mut map = Map::new();
            map.insert(RAW_ARGUMENTS_KEY.to_owned(), Value::String(call.function.arguments.clone()));
            map
        }
    }
}

/// Inverse of [`arguments_object`]
pub(crate) fn arguments_string(arguments: &Map<String, Value>) -> String {
    if arguments.len() == 1
        && let Some(Value::String(raw)) = arguments.get(RAW_ARGUMENTS_KEY)
    {
        return raw.clone();
    }

    Value::Object(arguments.clone()).to_string()
}
