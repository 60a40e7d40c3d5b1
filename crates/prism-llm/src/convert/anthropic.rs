//! Conversion between canonical types and the Anthropic Messages format

use std::collections::HashMap;

use serde_json::{Value, json};

use super::{arguments_object, outbound, settle_usage, unix_now};
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicMetadata, AnthropicModelList,
    AnthropicRequest, AnthropicResponse, AnthropicResponseBlock, AnthropicStreamContentBlock, AnthropicStreamDelta,
    AnthropicStreamEvent, AnthropicTool, AnthropicToolChoice, AnthropicUsage,
};
use crate::stream::ChunkUpdate;
use crate::types::{
    AssistantExtension, ChatRequest, ChatResponse, Choice, ChoiceBody, Content, ContentBlock, Delta, FinishReason,
    FunctionCall, Message, ModelInfo, ModelList, PromptTokensDetails, Role, ToolCall, ToolCallDelta,
    ToolChoice, Usage,
};

/// Default max tokens when not specified (Anthropic requires this field)
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// -- Outbound: canonical request -> Anthropic wire request --

/// Build the wire request
///
/// System and developer messages are hoisted into the top-level `system`
/// field. Returns `None` when no conversational message remains.
pub fn to_request(request: &ChatRequest, stream: bool) -> Option<AnthropicRequest> {
    let mut system: Vec<String> = Vec::new();
    let mut messages: Vec<AnthropicMessage> = Vec::new();

    for message in &request.messages {
        let message = outbound(message);

        match message.role {
            Role::System | Role::Developer => {
                if let Some(text) = message.text().filter(|t| !t.is_empty()) {
                    system.push(text);
                }
            }
            Role::Tool => {
                let Some(block) = tool_result_block(&message) else {
                    tracing::warn!("dropping tool result without a call id or name");
                    continue;
                };
                // Consecutive results answer one assistant turn and share a user message
                match messages.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && last
                                .content
                                .iter()
                                .all(|b| matches!(b, AnthropicContentBlock::ToolResult { .. })) =>
                    {
                        last.content.push(block);
                    }
                    _ => messages.push(AnthropicMessage {
                        role: "user".to_owned(),
                        content: vec![block],
                    }),
                }
            }
            Role::Assistant => messages.push(AnthropicMessage {
                role: "assistant".to_owned(),
                content: assistant_blocks(&message),
            }),
            Role::User => messages.push(AnthropicMessage {
                role: "user".to_owned(),
                content: content_blocks(message.content.as_ref()),
            }),
        }
    }

    if messages.is_empty() {
        return None;
    }

    let params = &request.params;

    let tools = params.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|tool| AnthropicTool {
                name: tool.function.name.clone(),
                description: tool.function.description.clone(),
                input_schema: tool
                    .function
                    .parameters
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object"})),
            })
            .collect()
    });

    Some(AnthropicRequest {
        model: request.model.clone(),
        max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system: (!system.is_empty()).then(|| system.join("\n\n")),
        messages,
        temperature: params.temperature,
        top_p: params.top_p,
        top_k: params.extra.get_i64("top_k").and_then(|k| u32::try_from(k).ok()),
        stop_sequences: params.stop.clone(),
        stream: stream.then_some(true),
        tools,
        tool_choice: params.tool_choice.as_ref().map(tool_choice_to_anthropic),
        metadata: params.user.clone().map(|user_id| AnthropicMetadata { user_id }),
    })
}

fn content_blocks(content: Option<&Content>) -> Vec<AnthropicContentBlock> {
    match content {
        None => Vec::new(),
        Some(Content::Text(text)) => vec![AnthropicContentBlock::Text { text: text.clone() }],
        Some(Content::Blocks(blocks)) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
                ContentBlock::ImageUrl { image_url } => AnthropicContentBlock::Image {
                    source: image_source(&image_url.url),
                },
            })
            .collect(),
    }
}

/// Split a `data:` URI into an inline source, anything else is a URL
fn image_source(url: &str) -> AnthropicImageSource {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((mime_and_encoding, data)) = rest.split_once(',')
    {
        let media_type = mime_and_encoding.strip_suffix(";base64").unwrap_or(mime_and_encoding);
        return AnthropicImageSource::Base64 {
            media_type: media_type.to_owned(),
            data: data.to_owned(),
        };
    }

    AnthropicImageSource::Url { url: url.to_owned() }
}

fn assistant_blocks(message: &Message) -> Vec<AnthropicContentBlock> {
    let mut blocks: Vec<AnthropicContentBlock> = content_blocks(message.content.as_ref())
        .into_iter()
        .filter(|block| !matches!(block, AnthropicContentBlock::Text { text } if text.is_empty()))
        .collect();

    for call in message.tool_calls() {
        let Some(name) = call.function.name.clone() else {
            tracing::warn!("dropping tool call without a function name");
            continue;
        };

        blocks.push(AnthropicContentBlock::ToolUse {
            // Calls from name-correlated providers reuse the name as the id
            id: call.id.clone().unwrap_or_else(|| name.clone()),
            name,
            input: Value::Object(arguments_object(call)),
        });
    }

    blocks
}

fn tool_result_block(message: &Message) -> Option<AnthropicContentBlock> {
    let response = message.tool_response.as_ref()?;
    let tool_use_id = response.id.clone().or_else(|| response.name.clone())?;

    Some(AnthropicContentBlock::ToolResult {
        tool_use_id,
        content: message.text(),
        is_error: None,
    })
}

fn tool_choice_to_anthropic(choice: &ToolChoice) -> AnthropicToolChoice {
    let (choice_type, name) = match choice {
        ToolChoice::None => ("none", None),
        ToolChoice::Auto => ("auto", None),
        ToolChoice::Required => ("any", None),
        ToolChoice::Function(name) => ("tool", Some(name.clone())),
    };

    AnthropicToolChoice {
        choice_type: choice_type.to_owned(),
        name,
    }
}

// -- Inbound: Anthropic wire response -> canonical response --

pub fn to_response(wire: AnthropicResponse, model: &str) -> ChatResponse {
    let mut text = String::new();
    let mut thinking = String::new();
    let mut tool_calls = Vec::new();

    for block in wire.content {
        match block {
            AnthropicResponseBlock::Text { text: part } => text.push_str(&part),
            AnthropicResponseBlock::Thinking { thinking: part } => thinking.push_str(&part),
            AnthropicResponseBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id: Some(id),
                index: u32::try_from(tool_calls.len()).unwrap_or(u32::MAX),
                function: FunctionCall::new(name, input.to_string()),
                extra_content: None,
            }),
            AnthropicResponseBlock::Unknown => {}
        }
    }

    let extension = AssistantExtension {
        tool_calls,
        reasoning: (!thinking.is_empty()).then_some(thinking),
        refusal: None,
    };

    let message = Message {
        role: Role::Assistant,
        content: (!text.is_empty()).then_some(Content::Text(text)),
        name: None,
        assistant: (!extension.is_empty()).then_some(extension),
        tool_response: None,
    };

    ChatResponse {
        id: wire.id,
        created: unix_now(),
        model: if wire.model.is_empty() { model.to_owned() } else { wire.model },
        choices: vec![Choice {
            index: 0,
            body: ChoiceBody::Message(message),
            finish_reason: wire.stop_reason.map(finish_reason),
        }],
        usage: wire.usage.map(usage_from_anthropic).as_ref().and_then(settle_usage),
        latency_ms: 0,
        raw: None,
    }
}

pub fn finish_reason(reason: String) -> FinishReason {
    match reason.as_str() {
        "end_turn" | "stop_sequence" | "pause_turn" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        _ => FinishReason::Other(reason),
    }
}

pub fn usage_from_anthropic(usage: AnthropicUsage) -> Usage {
    let mut converted = Usage::new(usage.input_tokens, usage.output_tokens);
    if usage.cache_read_input_tokens.is_some() {
        converted.prompt_tokens_details = Some(PromptTokensDetails {
            cached_tokens: usage.cache_read_input_tokens,
            audio_tokens: None,
        });
    }
    converted
}

// -- Stream conversion --

/// State for converting Anthropic stream events
///
/// Anthropic's content block index is shared by every block type, so a
/// tool use that follows a text block cannot use it as its tool-call index.
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    /// Content block index to sequential tool-call index
    tool_indices: HashMap<u32, u32>,
    next_tool_index: u32,
}

impl AnthropicStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, event: AnthropicStreamEvent) -> ChunkUpdate {
        match event {
            AnthropicStreamEvent::MessageStart { message } => ChunkUpdate {
                id: Some(message.id),
                model: message.model,
                delta: Delta {
                    role: Some(Role::Assistant),
                    ..Delta::default()
                },
                usage: message.usage.map(usage_from_anthropic),
                ..ChunkUpdate::default()
            },
            AnthropicStreamEvent::ContentBlockStart { index, content_block } => {
                ChunkUpdate::delta(self.block_start(index, content_block))
            }
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => {
                let delta = match delta {
                    AnthropicStreamDelta::TextDelta { text } => Delta::text(text),
                    AnthropicStreamDelta::ThinkingDelta { thinking } => Delta {
                        reasoning: Some(thinking),
                        ..Delta::default()
                    },
                    AnthropicStreamDelta::InputJsonDelta { partial_json } => match self.tool_indices.get(&index) {
                        Some(&tool_index) => Delta {
                            tool_calls: vec![ToolCallDelta {
                                index: tool_index,
                                arguments: Some(partial_json),
                                ..ToolCallDelta::default()
                            }],
                            ..Delta::default()
                        },
                        None => {
                            tracing::debug!(index, "input delta for a block that is not a tool use");
                            Delta::default()
                        }
                    },
                    AnthropicStreamDelta::Unknown => Delta::default(),
                };
                ChunkUpdate::delta(delta)
            }
            AnthropicStreamEvent::MessageDelta { delta, usage } => ChunkUpdate {
                finish_reason: delta.stop_reason.map(finish_reason),
                usage: usage.map(usage_from_anthropic),
                ..ChunkUpdate::default()
            },
            AnthropicStreamEvent::MessageStop => ChunkUpdate {
                done: true,
                ..ChunkUpdate::default()
            },
            AnthropicStreamEvent::ContentBlockStop { .. }
            | AnthropicStreamEvent::Ping
            | AnthropicStreamEvent::Error { .. } => ChunkUpdate::default(),
        }
    }

    fn block_start(&mut self, index: u32, block: AnthropicStreamContentBlock) -> Delta {
        match block {
            AnthropicStreamContentBlock::Text { text } => Delta::text(text),
            AnthropicStreamContentBlock::Thinking { thinking } => Delta {
                reasoning: Some(thinking),
                ..Delta::default()
            },
            AnthropicStreamContentBlock::ToolUse { id, name } => {
                let tool_index = self.next_tool_index;
                self.next_tool_index += 1;
                self.tool_indices.insert(index, tool_index);

                Delta {
                    tool_calls: vec![ToolCallDelta {
                        index: tool_index,
                        id: Some(id),
                        name: Some(name),
                        arguments: None,
                    }],
                    ..Delta::default()
                }
            }
            AnthropicStreamContentBlock::Unknown => Delta::default(),
        }
    }
}

// -- Models --

pub fn model_list(wire: AnthropicModelList, provider: &str) -> ModelList {
    ModelList {
        data: wire
            .data
            .into_iter()
            .map(|model| ModelInfo {
                id: format!("{provider}/{}", model.id),
                owned_by: "anthropic".to_owned(),
                created: None,
            })
            .collect(),
    }
}
