#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod provider;
mod types;

pub use provider::{TranscriptionProvider, build_provider};
pub use types::{TranscriptionRequest, TranscriptionResponse};
