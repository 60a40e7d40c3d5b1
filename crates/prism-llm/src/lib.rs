//! Provider adaptation and stream normalization for Prism
//!
//! Converts between one canonical chat model and the wire formats of
//! `OpenAI`-compatible, Anthropic, Google and Ollama backends, and turns each
//! provider's streaming transport into one uniform sequence of
//! [`StreamEvent`]s. Responses API requests are served on top of the same
//! chat adapters.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod adapter;
pub mod convert;
pub mod correlation;
pub mod error;
pub mod hooks;
mod json_scan;
pub mod large_payload;
pub mod protocol;
pub mod provider;
pub mod reasoning;
pub mod responses;
pub mod stream;
pub mod types;
pub mod upstream;
pub mod usage;

pub use adapter::{Framing, ProviderAdapter, StreamDecoder, UsageField, WireRequest};
pub use hooks::{HookPipeline, PostHook};
pub use large_payload::LargePayloadResult;
pub use provider::{ChatOutcome, HttpProvider, Provider};
pub use responses::{ResponsesEventStream, ResponsesRequest, ResponsesResponse, ResponsesStreamEvent};
pub use stream::{EventStream, NormalizerOptions};
pub use types::{ChatRequest, ChatResponse, Message, StreamEvent};
pub use upstream::Upstream;
