#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod provider;
mod types;

pub use provider::{SpeechProvider, build_provider};
pub use types::{SpeechRequest, SpeechResponse};
