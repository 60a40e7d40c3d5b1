//! Shared building blocks for Prism
//!
//! Holds the pieces every provider crate agrees on: the canonical error
//! taxonomy, provider and request kinds, the per-request execution context,
//! the reusable buffer pool and typed access to provider extension params.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod context;
pub mod error;
pub mod extra;
pub mod kind;
pub mod pool;

pub use context::{ExecutionContext, LargePayloadOptions};
pub use error::{Attribution, CanonicalError, ErrorKind};
pub use extra::ExtraParams;
pub use kind::{ProviderKind, RequestKind};
pub use pool::{Pool, Pooled, Reset};
