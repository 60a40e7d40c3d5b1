//! Canonical types for LLM request/response representation
//!
//! These types are provider-agnostic. Every wire format converts to and from
//! them, and nothing in here knows about a specific provider.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{AssistantExtension, Content, ContentBlock, ImageUrl, Message, Role, ToolResponse};
pub use request::{ChatParameters, ChatRequest, JsonSchemaFormat, ResponseFormat};
pub use response::{
    ChatResponse, Choice, ChoiceBody, CompletionTokensDetails, FinishReason, ModelInfo, ModelList,
    PromptTokensDetails, Usage,
};
pub use stream::{Delta, StreamEvent, ToolCallDelta};
pub use tool::{FunctionCall, FunctionDefinition, ToolCall, ToolChoice, ToolDefinition};
