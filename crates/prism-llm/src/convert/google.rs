//! Conversion between canonical types and the Google Generative Language format
//!
//! Gemini correlates tool results by function name, so outgoing tool messages
//! are resolved through a [`ToolNameMap`] and returned calls use the function
//! name as their id.

use serde_json::{Value, json};

use super::{arguments_object, outbound, settle_usage, unix_now};
use crate::correlation::ToolNameMap;
use crate::protocol::google::{
    GoogleCandidate, GoogleContent, GoogleFileData, GoogleFunctionCall, GoogleFunctionCallingConfig,
    GoogleFunctionDeclaration, GoogleFunctionResponse, GoogleGenerationConfig, GoogleInlineData, GoogleModelList,
    GooglePart, GoogleRequest, GoogleResponse, GoogleTool, GoogleToolConfig, GoogleUsageMetadata,
};
use crate::stream::ChunkUpdate;
use crate::types::{
    AssistantExtension, ChatRequest, ChatResponse, Choice, ChoiceBody, CompletionTokensDetails, Content,
    ContentBlock, FinishReason, FunctionCall, Message, ModelInfo, ModelList, PromptTokensDetails,
    ResponseFormat, Role, ToolCall, ToolCallDelta, ToolChoice, Usage,
};

const JSON_MIME: &str = "application/json";

// -- Outbound: canonical request -> Google wire request --

pub fn to_request(request: &ChatRequest) -> Option<GoogleRequest> {
    let mut system_parts = Vec::new();
    let mut contents: Vec<GoogleContent> = Vec::new();
    let mut names = ToolNameMap::new();

    for message in &request.messages {
        names.record(message);

        match message.role {
            Role::System | Role::Developer => {
                if let Some(text) = message.text().filter(|t| !t.is_empty()) {
                    system_parts.push(GooglePart::text(text));
                }
            }
            Role::User => contents.push(GoogleContent {
                role: Some("user".to_owned()),
                parts: content_parts(message.content.as_ref()),
            }),
            Role::Assistant => contents.push(GoogleContent {
                role: Some("model".to_owned()),
                parts: model_parts(&outbound(message)),
            }),
            Role::Tool => {
                let Some(name) = names.resolve(message) else {
                    tracing::warn!(
                        tool_call_id = message.tool_response.as_ref().and_then(|r| r.id.as_deref()).unwrap_or_default(),
                        "dropping tool result that matches no earlier tool call"
                    );
                    continue;
                };

                let part = GooglePart {
                    function_response: Some(GoogleFunctionResponse {
                        name: name.to_owned(),
                        response: function_response_payload(message.text().unwrap_or_default()),
                    }),
                    ..GooglePart::default()
                };

                // Parallel results go back in a single turn
                match contents.last_mut() {
                    Some(last)
                        if last.role.as_deref() == Some("user")
                            && last.parts.iter().all(|p| p.function_response.is_some()) =>
                    {
                        last.parts.push(part);
                    }
                    _ => contents.push(GoogleContent {
                        role: Some("user".to_owned()),
                        parts: vec![part],
                    }),
                }
            }
        }
    }

    if contents.is_empty() {
        return None;
    }

    let params = &request.params;

    let mut generation_config = GoogleGenerationConfig {
        temperature: params.temperature,
        top_p: params.top_p,
        top_k: params.extra.get_i64("top_k").and_then(|k| u32::try_from(k).ok()),
        max_output_tokens: params.max_tokens,
        stop_sequences: params.stop.clone(),
        presence_penalty: params.presence_penalty,
        frequency_penalty: params.frequency_penalty,
        seed: params.seed,
        candidate_count: params.extra.get_i64("candidate_count").and_then(|n| u32::try_from(n).ok()),
        response_mime_type: None,
        response_schema: None,
    };

    match &params.response_format {
        Some(ResponseFormat::JsonObject) => generation_config.response_mime_type = Some(JSON_MIME.to_owned()),
        Some(ResponseFormat::JsonSchema { json_schema }) => {
            generation_config.response_mime_type = Some(JSON_MIME.to_owned());
            generation_config.response_schema = json_schema.schema.clone();
        }
        Some(ResponseFormat::Text) | None => {}
    }

    let tools = params.tools.as_ref().map(|tools| {
        vec![GoogleTool {
            function_declarations: tools
                .iter()
                .map(|tool| GoogleFunctionDeclaration {
                    name: tool.function.name.clone(),
                    description: tool.function.description.clone(),
                    parameters: tool.function.parameters.clone(),
                })
                .collect(),
        }]
    });

    let tool_config = params.tool_choice.as_ref().map(|choice| {
        let (mode, allowed_function_names) = match choice {
            ToolChoice::None => ("NONE", None),
            ToolChoice::Auto => ("AUTO", None),
            ToolChoice::Required => ("ANY", None),
            ToolChoice::Function(name) => ("ANY", Some(vec![name.clone()])),
        };
        GoogleToolConfig {
            function_calling_config: GoogleFunctionCallingConfig {
                mode: mode.to_owned(),
                allowed_function_names,
            },
        }
    });

    Some(GoogleRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then(|| GoogleContent {
            role: None,
            parts: system_parts,
        }),
        generation_config: (!generation_config.is_empty()).then_some(generation_config),
        tools,
        tool_config,
    })
}

fn content_parts(content: Option<&Content>) -> Vec<GooglePart> {
    match content {
        None => Vec::new(),
        Some(Content::Text(text)) if text.is_empty() => Vec::new(),
        Some(Content::Text(text)) => vec![GooglePart::text(text.clone())],
        Some(Content::Blocks(blocks)) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => GooglePart::text(text.clone()),
                ContentBlock::ImageUrl { image_url } => image_part(&image_url.url),
            })
            .collect(),
    }
}

fn image_part(url: &str) -> GooglePart {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((mime_and_encoding, data)) = rest.split_once(',')
    {
        let mime_type = mime_and_encoding.strip_suffix(";base64").unwrap_or(mime_and_encoding);
        return GooglePart {
            inline_data: Some(GoogleInlineData {
                mime_type: mime_type.to_owned(),
                data: data.to_owned(),
            }),
            ..GooglePart::default()
        };
    }

    GooglePart {
        file_data: Some(GoogleFileData {
            mime_type: None,
            file_uri: url.to_owned(),
        }),
        ..GooglePart::default()
    }
}

fn model_parts(message: &Message) -> Vec<GooglePart> {
    let mut parts = content_parts(message.content.as_ref());

    for call in message.tool_calls() {
        let Some(name) = call.function.name.clone() else {
            tracing::warn!("dropping tool call without a function name");
            continue;
        };
        parts.push(GooglePart {
            function_call: Some(GoogleFunctionCall {
                name,
                args: Value::Object(arguments_object(call)),
            }),
            ..GooglePart::default()
        });
    }

    // Gemini rejects a turn without parts
    if parts.is_empty() {
        parts.push(GooglePart::text(String::new()));
    }

    parts
}

/// Function responses must be objects, so plain text is wrapped
fn function_response_payload(output: String) -> Value {
    match serde_json::from_str::<Value>(&output) {
        Ok(Value::Object(object)) => Value::Object(object),
        _ => json!({ "content": output }),
    }
}

// -- Inbound: Google wire response -> canonical response --

pub fn to_response(wire: GoogleResponse, model: &str) -> ChatResponse {
    let created = unix_now();

    let choices = wire
        .candidates
        .into_iter()
        .zip(0u32..)
        .map(|(candidate, position)| candidate_to_choice(candidate, position))
        .collect();

    ChatResponse {
        id: wire.response_id.unwrap_or_else(|| format!("google-{created}")),
        created,
        model: wire.model_version.unwrap_or_else(|| model.to_owned()),
        choices,
        usage: wire.usage_metadata.map(usage_from_google).as_ref().and_then(settle_usage),
        latency_ms: 0,
        raw: None,
    }
}

fn candidate_to_choice(candidate: GoogleCandidate, position: u32) -> Choice {
    let mut text = String::new();
    let mut thoughts = String::new();
    let mut tool_calls = Vec::new();

    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(call) = part.function_call {
            tool_calls.push(ToolCall {
                id: Some(call.name.clone()),
                index: u32::try_from(tool_calls.len()).unwrap_or(u32::MAX),
                function: FunctionCall::new(call.name, call.args.to_string()),
                extra_content: None,
            });
        } else if let Some(part_text) = part.text {
            if part.thought == Some(true) {
                thoughts.push_str(&part_text);
            } else {
                text.push_str(&part_text);
            }
        }
    }

    let finish_reason = candidate
        .finish_reason
        .map(|reason| promote(finish_reason(reason), !tool_calls.is_empty()));

    let extension = AssistantExtension {
        tool_calls,
        reasoning: (!thoughts.is_empty()).then_some(thoughts),
        refusal: None,
    };

    Choice {
        index: candidate.index.unwrap_or(position),
        body: ChoiceBody::Message(Message {
            role: Role::Assistant,
            content: (!text.is_empty()).then_some(Content::Text(text)),
            name: None,
            assistant: (!extension.is_empty()).then_some(extension),
            tool_response: None,
        }),
        finish_reason,
    }
}

pub fn finish_reason(reason: String) -> FinishReason {
    match reason.as_str() {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        _ => FinishReason::Other(reason.to_lowercase()),
    }
}

/// Gemini reports `STOP` even when the turn ended in function calls
fn promote(reason: FinishReason, has_tool_calls: bool) -> FinishReason {
    if has_tool_calls && reason == FinishReason::Stop {
        FinishReason::ToolCalls
    } else {
        reason
    }
}

pub fn usage_from_google(usage: GoogleUsageMetadata) -> Usage {
    Usage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
        prompt_tokens_details: usage.cached_content_token_count.map(|cached| PromptTokensDetails {
            cached_tokens: Some(cached),
            audio_tokens: None,
        }),
        completion_tokens_details: usage.thoughts_token_count.map(|thoughts| CompletionTokensDetails {
            reasoning_tokens: Some(thoughts),
            audio_tokens: None,
        }),
    }
}

// -- Stream conversion --

/// State for converting Google stream chunks
///
/// Every streamed chunk is a complete `GenerateContentResponse`. Function
/// calls arrive whole, so each one takes the next tool-call index.
#[derive(Debug, Default)]
pub struct GoogleStreamState {
    next_tool_index: u32,
}

impl GoogleStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one chunk, reading only the first candidate
    pub fn update(&mut self, chunk: GoogleResponse) -> ChunkUpdate {
        let mut update = ChunkUpdate {
            id: chunk.response_id,
            model: chunk.model_version,
            usage: chunk.usage_metadata.map(usage_from_google),
            ..ChunkUpdate::default()
        };

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return update;
        };

        let delta = &mut update.delta;
        if let Some(content) = candidate.content {
            if content.role.as_deref() == Some("model") {
                delta.role = Some(Role::Assistant);
            }

            for part in content.parts {
                if let Some(call) = part.function_call {
                    delta.tool_calls.push(ToolCallDelta {
                        index: self.next_tool_index,
                        id: Some(call.name.clone()),
                        name: Some(call.name),
                        arguments: Some(call.args.to_string()),
                    });
                    self.next_tool_index += 1;
                } else if let Some(text) = part.text {
                    let slot = if part.thought == Some(true) {
                        &mut delta.reasoning
                    } else {
                        &mut delta.content
                    };
                    slot.get_or_insert_with(String::new).push_str(&text);
                }
            }
        }

        update.finish_reason = candidate
            .finish_reason
            .map(|reason| promote(finish_reason(reason), self.next_tool_index > 0));

        update
    }
}

// -- Models --

pub fn model_list(wire: GoogleModelList, provider: &str) -> ModelList {
    ModelList {
        data: wire
            .models
            .into_iter()
            .filter(|model| {
                model.supported_generation_methods.is_empty()
                    || model.supported_generation_methods.iter().any(|m| m == "generateContent")
            })
            .map(|model| {
                let id = model.name.strip_prefix("models/").unwrap_or(&model.name);
                ModelInfo {
                    id: format!("{provider}/{id}"),
                    owned_by: "google".to_owned(),
                    created: None,
                }
            })
            .collect(),
    }
}
