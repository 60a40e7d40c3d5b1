use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool/function result
    Tool,
    /// Developer instruction, treated as system by providers without the role
    Developer,
}

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Message content, absent for pure tool-call turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    /// Optional participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Assistant-only fields
    #[serde(default, skip_serializing_if = "Option::is_none", flatten)]
    pub assistant: Option<AssistantExtension>,
    /// Tool-response-only fields
    #[serde(default, skip_serializing_if = "Option::is_none", flatten)]
    pub tool_response: Option<ToolResponse>,
}

impl Message {
    fn with_content(role: Role, content: Content) -> Self {
        Self {
            role,
            content: Some(content),
            name: None,
            assistant: None,
            tool_response: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_content(Role::System, Content::Text(text.into()))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_content(Role::User, Content::Text(text.into()))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_content(Role::Assistant, Content::Text(text.into()))
    }

    /// Assistant turn that only calls tools
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            name: None,
            assistant: Some(AssistantExtension {
                tool_calls,
                ..AssistantExtension::default()
            }),
            tool_response: None,
        }
    }

    /// Tool result answering the call with `id`
    pub fn tool_result(id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(Content::Text(output.into())),
            name: None,
            assistant: None,
            tool_response: Some(ToolResponse {
                id: Some(id.into()),
                name: None,
            }),
        }
    }

    /// Text of the message, joining text blocks and skipping images
    pub fn text(&self) -> Option<String> {
        self.content.as_ref().map(Content::as_text)
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        self.assistant.as_ref().map_or(&[], |a| a.tool_calls.as_slice())
    }

    pub fn reasoning(&self) -> Option<&str> {
        self.assistant.as_ref().and_then(|a| a.reasoning.as_deref())
    }
}

/// Message content, exactly one representation at a time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text content
    Text(String),
    /// Ordered typed blocks
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Extract text content, joining blocks if necessary
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::ImageUrl { .. } => None,
                })
                .collect(),
        }
    }

    /// Image references in block order
    pub fn images(&self) -> impl Iterator<Item = &ImageUrl> {
        let blocks = match self {
            Self::Text(_) => &[][..],
            Self::Blocks(blocks) => blocks.as_slice(),
        };

        blocks.iter().filter_map(|b| match b {
            ContentBlock::ImageUrl { image_url } => Some(image_url),
            ContentBlock::Text { .. } => None,
        })
    }
}

/// Individual block within a multipart message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Image reference, either a remote URL or a `data:` URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    /// Detail level hint (e.g. "auto", "low", "high")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Fields only meaningful on assistant messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantExtension {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Auxiliary reasoning text produced alongside the answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Refusal text when the model declined to answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
}

impl AssistantExtension {
    pub fn is_empty(&self) -> bool {
        self.tool_calls.is_empty() && self.reasoning.is_none() && self.refusal.is_none()
    }
}

/// Identifies the tool call a tool message answers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    #[serde(default, rename = "tool_call_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "tool_name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
