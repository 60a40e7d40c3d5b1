//! Upstream wire formats, one submodule per provider family

pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;
