//! Responses API served through chat completions
//!
//! Backends without a native Responses endpoint answer Responses requests
//! by way of their chat adapter. Requests become [`ChatRequest`]s, responses
//! convert back, and a canonical event stream is folded into the
//! sequence-numbered Responses event stream.
//!
//! [`ChatRequest`]: crate::types::ChatRequest

mod convert;
mod stream;
pub mod types;

pub use stream::{ResponsesEventStream, ResponsesStreamState, responses_events};
pub use types::{
    InputContent, InputItem, InputMessage, InputPart, OutputContent, OutputItem, ResponseStatus, ResponsesEvent,
    ResponsesInput, ResponsesRequest, ResponsesResponse, ResponsesStreamEvent, ResponsesTool, ResponsesToolChoice,
    ResponsesUsage, SummaryPart, TypedItem,
};
