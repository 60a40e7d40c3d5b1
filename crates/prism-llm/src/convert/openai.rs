//! Conversion between canonical types and the `OpenAI` wire format

use serde_json::{Map, Value, json};

use super::{outbound, settle_usage, unix_now};
use crate::protocol::openai::{
    OpenAiChoiceMessage, OpenAiContent, OpenAiContentPart, OpenAiFunction, OpenAiFunctionCall, OpenAiImageUrl,
    OpenAiMessage, OpenAiModelList, OpenAiRequest, OpenAiResponse, OpenAiStreamChunk, OpenAiStreamOptions,
    OpenAiStreamToolCall, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::stream::ChunkUpdate;
use crate::types::{
    AssistantExtension, ChatRequest, ChatResponse, Choice, ChoiceBody, CompletionTokensDetails, Content,
    ContentBlock, Delta, FinishReason, FunctionCall, Message, ModelInfo, ModelList, PromptTokensDetails, Role,
    ToolCall, ToolCallDelta, ToolChoice, Usage,
};

/// Parameters that map onto named request fields and must not be
/// repeated through the extension map
const RESERVED_KEYS: &[&str] = &[
    "model",
    "messages",
    "stream",
    "stream_options",
    "tools",
    "tool_choice",
    "temperature",
    "top_p",
    "max_tokens",
    "stop",
    "frequency_penalty",
    "presence_penalty",
    "seed",
    "user",
    "response_format",
];

// -- Outbound: canonical request -> OpenAI wire request --

/// Build the wire request, `None` when there are no messages to send
pub fn to_request(request: &ChatRequest, stream: bool) -> Option<OpenAiRequest> {
    if request.messages.is_empty() {
        return None;
    }

    let params = &request.params;

    let extra: Map<String, Value> = params
        .extra
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Some(OpenAiRequest {
        model: request.model.clone(),
        messages: request.messages.iter().map(|m| message_to_openai(&outbound(m))).collect(),
        temperature: params.temperature,
        top_p: params.top_p,
        max_tokens: params.max_tokens,
        stop: params.stop.clone(),
        frequency_penalty: params.frequency_penalty,
        presence_penalty: params.presence_penalty,
        seed: params.seed,
        user: params.user.clone(),
        stream: stream.then_some(true),
        tools: params.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|tool| OpenAiTool {
                    tool_type: tool.tool_type.clone(),
                    function: OpenAiFunction {
                        name: tool.function.name.clone(),
                        description: tool.function.description.clone(),
                        parameters: tool.function.parameters.clone(),
                    },
                })
                .collect()
        }),
        tool_choice: params.tool_choice.as_ref().map(tool_choice_to_openai),
        response_format: params
            .response_format
            .as_ref()
            .and_then(|format| serde_json::to_value(format).ok()),
        stream_options: stream.then_some(OpenAiStreamOptions { include_usage: true }),
        extra,
    })
}

fn message_to_openai(message: &Message) -> OpenAiMessage {
    let content = message.content.as_ref().map(|content| match content {
        Content::Text(text) => OpenAiContent::Text(text.clone()),
        Content::Blocks(blocks) => OpenAiContent::Parts(
            blocks
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => OpenAiContentPart::Text { text: text.clone() },
                    ContentBlock::ImageUrl { image_url } => OpenAiContentPart::ImageUrl {
                        image_url: OpenAiImageUrl {
                            url: image_url.url.clone(),
                            detail: image_url.detail.clone(),
                        },
                    },
                })
                .collect(),
        ),
    });

    let tool_calls: Vec<OpenAiToolCall> = message
        .tool_calls()
        .iter()
        .map(|call| OpenAiToolCall {
            id: call.id.clone(),
            tool_type: "function".to_owned(),
            function: OpenAiFunctionCall {
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
            },
        })
        .collect();

    // A response that only knows the function name reuses it as the id
    let tool_call_id = message
        .tool_response
        .as_ref()
        .and_then(|response| response.id.clone().or_else(|| response.name.clone()));

    OpenAiMessage {
        role: message.role.to_string(),
        content,
        name: message.name.clone(),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id,
    }
}

fn tool_choice_to_openai(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::None => Value::from("none"),
        ToolChoice::Auto => Value::from("auto"),
        ToolChoice::Required => Value::from("required"),
        ToolChoice::Function(name) => json!({"type": "function", "function": {"name": name}}),
    }
}

// -- Inbound: OpenAI wire response -> canonical response --

pub fn to_response(wire: OpenAiResponse, model: &str) -> ChatResponse {
    let choices = wire
        .choices
        .into_iter()
        .map(|choice| {
            let finish_reason = choice.finish_reason.map(finish_reason);
            Choice {
                index: choice.index,
                body: ChoiceBody::Message(message_from_openai(choice.message)),
                finish_reason,
            }
        })
        .collect();

    ChatResponse {
        id: wire.id,
        created: wire.created.unwrap_or_else(unix_now),
        model: if wire.model.is_empty() { model.to_owned() } else { wire.model },
        choices,
        usage: wire.usage.map(usage_from_openai).as_ref().and_then(settle_usage),
        latency_ms: 0,
        raw: None,
    }
}

fn message_from_openai(message: OpenAiChoiceMessage) -> Message {
    let tool_calls: Vec<ToolCall> = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .zip(0u32..)
        .map(|(call, index)| ToolCall {
            id: call.id,
            index,
            function: FunctionCall {
                name: call.function.name,
                arguments: call.function.arguments,
            },
            extra_content: None,
        })
        .filter(|call| !call.function.is_empty())
        .collect();

    let extension = AssistantExtension {
        tool_calls,
        reasoning: message.reasoning_content,
        refusal: message.refusal,
    };

    Message {
        role: Role::Assistant,
        content: message.content.map(Content::Text),
        name: None,
        assistant: (!extension.is_empty()).then_some(extension),
        tool_response: None,
    }
}

/// Map an `OpenAI` finish reason, folding the legacy `function_call`
/// into `tool_calls`
pub fn finish_reason(reason: String) -> FinishReason {
    match reason.as_str() {
        "function_call" => FinishReason::ToolCalls,
        _ => FinishReason::from(reason),
    }
}

pub fn usage_from_openai(usage: OpenAiUsage) -> Usage {
    Usage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        prompt_tokens_details: usage.prompt_tokens_details.map(|details| PromptTokensDetails {
            cached_tokens: details.cached_tokens,
            audio_tokens: details.audio_tokens,
        }),
        completion_tokens_details: usage.completion_tokens_details.map(|details| CompletionTokensDetails {
            reasoning_tokens: details.reasoning_tokens,
            audio_tokens: details.audio_tokens,
        }),
    }
}

// -- Streaming --

/// Convert one `OpenAI` stream chunk
///
/// Only the first choice is followed. The stream ends on the `[DONE]`
/// sentinel, never in-band.
pub fn chunk_update(chunk: OpenAiStreamChunk) -> ChunkUpdate {
    let mut update = ChunkUpdate {
        id: chunk.id,
        model: chunk.model,
        usage: chunk.usage.map(usage_from_openai),
        ..ChunkUpdate::default()
    };

    let Some(choice) = chunk.choices.into_iter().next() else {
        return update;
    };

    update.finish_reason = choice.finish_reason.map(finish_reason);

    if let Some(delta) = choice.delta {
        update.delta = Delta {
            role: delta.role.and_then(|role| role.parse().ok()),
            content: delta.content,
            reasoning: delta.reasoning_content,
            refusal: delta.refusal,
            tool_calls: delta
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(tool_call_delta)
                .collect(),
        };
    }

    update
}

fn tool_call_delta(call: OpenAiStreamToolCall) -> ToolCallDelta {
    let (name, arguments) = call
        .function
        .map_or((None, None), |function| (function.name, function.arguments));

    ToolCallDelta {
        index: call.index,
        id: call.id,
        name,
        arguments,
    }
}

// -- Models --

pub fn model_list(wire: OpenAiModelList, provider: &str) -> ModelList {
    ModelList {
        data: wire
            .data
            .into_iter()
            .map(|model| ModelInfo {
                id: format!("{provider}/{}", model.id),
                owned_by: model.owned_by.unwrap_or_else(|| provider.to_owned()),
                created: model.created,
            })
            .collect(),
    }
}
