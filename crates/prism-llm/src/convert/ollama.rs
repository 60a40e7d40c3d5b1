//! Conversion between canonical types and Ollama's native `/api/chat` format
//!
//! Ollama has no tool-call ids. Tool results name the function they answer,
//! and returned calls carry no id at all.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use serde_json::Value;

use super::{arguments_object, arguments_string, outbound, settle_usage, unix_now, unix_seconds};
use crate::correlation::{self, ToolNameMap};
use crate::protocol::ollama::{
    OllamaChatRequest, OllamaChatResponse, OllamaMessage, OllamaOptions, OllamaTags, OllamaThink, OllamaTool,
    OllamaToolCall, OllamaToolCallFunction, OllamaToolFunction,
};
use crate::reasoning;
use crate::stream::ChunkUpdate;
use crate::types::{
    AssistantExtension, ChatParameters, ChatRequest, ChatResponse, Choice, ChoiceBody, Content, ContentBlock,
    FinishReason, FunctionCall, ImageUrl, JsonSchemaFormat, Message, ModelInfo, ModelList, ResponseFormat, Role,
    ToolCall, ToolCallDelta, ToolDefinition, Usage,
};

/// Extension namespace for reasoning carried in tool-call data
const NAMESPACE: &str = "ollama";

/// Prefix given to images coming back from Ollama, which does not say
const IMAGE_DATA_PREFIX: &str = "data:image/jpeg;base64,";

// -- Outbound: canonical request -> Ollama wire request --

pub fn to_request(request: &ChatRequest, stream: bool) -> Option<OllamaChatRequest> {
    let mut names = ToolNameMap::new();
    let mut messages = Vec::with_capacity(request.messages.len());

    for message in &request.messages {
        names.record(message);
        let message = outbound(message);

        let mut wire = OllamaMessage {
            role: role_to_ollama(message.role).to_owned(),
            ..OllamaMessage::default()
        };

        match message.role {
            Role::Assistant if !message.tool_calls().is_empty() => {
                // Function invocation turns carry neither content nor images
                wire.tool_calls = message.tool_calls().iter().map(tool_call_to_ollama).collect();
            }
            _ => {
                let (content, images) = content_to_ollama(message.content.as_ref());
                wire.content = content;
                wire.images = images;
            }
        }

        if message.role == Role::Assistant {
            wire.thinking = message.reasoning().filter(|r| !r.is_empty()).map(str::to_owned);
        }

        if message.role == Role::Tool {
            let Some(name) = names.resolve(&message) else {
                tracing::warn!(
                    tool_call_id = message.tool_response.as_ref().and_then(|r| r.id.as_deref()).unwrap_or_default(),
                    "dropping tool message without a resolvable function name"
                );
                continue;
            };
            wire.tool_name = Some(name.to_owned());
        }

        messages.push(wire);
    }

    if messages.is_empty() {
        return None;
    }

    let params = &request.params;
    let options = options_from_params(params);

    Some(OllamaChatRequest {
        model: request.model.clone(),
        messages,
        tools: params.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|tool| OllamaTool {
                    tool_type: "function".to_owned(),
                    function: OllamaToolFunction {
                        name: tool.function.name.clone(),
                        description: tool.function.description.clone(),
                        parameters: tool.function.parameters.clone(),
                    },
                })
                .collect()
        }),
        think: params.extra.get::<OllamaThink>("think"),
        format: params.response_format.as_ref().and_then(|format| match format {
            ResponseFormat::JsonObject => Some(Value::String("json".to_owned())),
            ResponseFormat::JsonSchema { json_schema } => json_schema.schema.clone(),
            ResponseFormat::Text => None,
        }),
        options: (!options.is_empty()).then_some(options),
        stream,
        keep_alive: match params.extra.raw("keep_alive") {
            Some(Value::String(duration)) => Some(duration.clone()),
            Some(Value::Number(seconds)) => Some(seconds.to_string()),
            _ => None,
        },
    })
}

const fn role_to_ollama(role: Role) -> &'static str {
    match role {
        Role::System | Role::Developer => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn options_from_params(params: &ChatParameters) -> OllamaOptions {
    let extra = &params.extra;

    OllamaOptions {
        num_predict: params.max_tokens.map(i64::from),
        temperature: params.temperature,
        top_p: params.top_p,
        top_k: extra.get_i64("top_k"),
        seed: params.seed,
        stop: params.stop.clone(),
        presence_penalty: params.presence_penalty,
        frequency_penalty: params.frequency_penalty,
        repeat_penalty: extra.get_f64("repeat_penalty"),
        repeat_last_n: extra.get_i64("repeat_last_n"),
        num_ctx: extra.get_i64("num_ctx"),
        num_batch: extra.get_i64("num_batch"),
        num_gpu: extra.get_i64("num_gpu"),
        num_thread: extra.get_i64("num_thread"),
        mirostat: extra.get_i64("mirostat"),
        mirostat_eta: extra.get_f64("mirostat_eta"),
        mirostat_tau: extra.get_f64("mirostat_tau"),
        tfs_z: extra.get_f64("tfs_z"),
        typical_p: extra.get_f64("typical_p"),
    }
}

/// Text joined by newlines plus raw base64 images
fn content_to_ollama(content: Option<&Content>) -> (String, Vec<String>) {
    match content {
        None => (String::new(), Vec::new()),
        Some(Content::Text(text)) => (text.clone(), Vec::new()),
        Some(Content::Blocks(blocks)) => {
            let mut text = Vec::new();
            let mut images = Vec::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text: part } => text.push(part.as_str()),
                    ContentBlock::ImageUrl { image_url } => images.extend(extract_base64_image(&image_url.url)),
                }
            }
            (text.join("\n"), images)
        }
    }
}

/// Raw base64 payload of an image reference
///
/// Ollama only takes inline base64, so remote URLs and anything that fails
/// to decode are dropped.
fn extract_base64_image(url: &str) -> Option<String> {
    let preview: String = url.chars().take(50).collect();

    if url.starts_with("data:") {
        let Some((_, data)) = url.split_once(',').filter(|(_, data)| !data.is_empty()) else {
            tracing::warn!(url = %preview, "dropping malformed data URL");
            return None;
        };
        if is_valid_base64(data) {
            return Some(data.to_owned());
        }
        tracing::warn!(url = %preview, "dropping data URL with invalid base64");
        return None;
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        tracing::warn!(url = %preview, "Ollama does not accept remote image URLs, dropping image");
        return None;
    }

    if is_valid_base64(url) {
        return Some(url.to_owned());
    }

    tracing::warn!(url = %preview, "dropping image that is neither a data URL nor base64");
    None
}

fn is_valid_base64(data: &str) -> bool {
    if data.len() < 4 {
        return false;
    }

    STANDARD
        .decode(data)
        .or_else(|_| STANDARD_NO_PAD.decode(data))
        .is_ok_and(|decoded| !decoded.is_empty())
}

fn tool_call_to_ollama(call: &ToolCall) -> OllamaToolCall {
    OllamaToolCall {
        function: OllamaToolCallFunction {
            index: None,
            name: call.function.name.clone().unwrap_or_default(),
            arguments: arguments_object(call),
        },
    }
}

// -- Reverse: Ollama wire request -> canonical request --

/// Canonical form of a request written against Ollama's own API
///
/// Assistant `thinking` is kept in tool-call extension data under the
/// `ollama` namespace so that forwarding the request back to Ollama restores
/// it verbatim. Outbound conversions lift it again.
pub fn from_request(wire: OllamaChatRequest) -> ChatRequest {
    let messages = wire
        .messages
        .into_iter()
        .filter_map(|message| {
            let mut converted = message_from_ollama(message)?;
            if let Some(extension) = converted.assistant.as_mut() {
                reasoning::stash(extension, NAMESPACE);
            }
            Some(converted)
        })
        .collect();

    let mut params = ChatParameters::default();

    if let Some(options) = wire.options {
        params.max_tokens = options.num_predict.and_then(|n| u32::try_from(n).ok());
        params.temperature = options.temperature;
        params.top_p = options.top_p;
        params.stop = options.stop;
        params.presence_penalty = options.presence_penalty;
        params.frequency_penalty = options.frequency_penalty;
        params.seed = options.seed;

        let integers = [
            ("top_k", options.top_k),
            ("num_ctx", options.num_ctx),
            ("repeat_last_n", options.repeat_last_n),
            ("num_batch", options.num_batch),
            ("num_gpu", options.num_gpu),
            ("num_thread", options.num_thread),
            ("mirostat", options.mirostat),
        ];
        for (key, value) in integers {
            if let Some(value) = value {
                params.extra.insert(key, value);
            }
        }

        let floats = [
            ("repeat_penalty", options.repeat_penalty),
            ("mirostat_eta", options.mirostat_eta),
            ("mirostat_tau", options.mirostat_tau),
            ("tfs_z", options.tfs_z),
            ("typical_p", options.typical_p),
        ];
        for (key, value) in floats {
            if let Some(value) = value {
                params.extra.insert(key, value);
            }
        }
    }

    if let Some(keep_alive) = wire.keep_alive {
        params.extra.insert("keep_alive", keep_alive);
    }
    match wire.think {
        Some(OllamaThink::Enabled(enabled)) => {
            params.extra.insert("think", enabled);
        }
        Some(OllamaThink::Level(level)) => {
            params.extra.insert("think", level);
        }
        None => {}
    }

    params.response_format = wire.format.map(|format| match format {
        Value::String(kind) if kind == "json" => ResponseFormat::JsonObject,
        schema => ResponseFormat::JsonSchema {
            json_schema: JsonSchemaFormat {
                name: "response".to_owned(),
                schema: Some(schema),
                strict: None,
            },
        },
    });

    params.tools = wire.tools.map(|tools| {
        tools
            .into_iter()
            .map(|tool| ToolDefinition::function(tool.function.name, tool.function.description, tool.function.parameters))
            .collect()
    });

    ChatRequest {
        model: wire.model,
        messages,
        params,
    }
}

/// Canonical message for an Ollama message, reasoning left in `reasoning`
fn message_from_ollama(message: OllamaMessage) -> Option<Message> {
    let Ok(role) = message.role.parse::<Role>() else {
        tracing::debug!(role = %message.role, "skipping message with unknown role");
        return None;
    };

    let has_tool_calls = role == Role::Assistant && !message.tool_calls.is_empty();

    let content = if has_tool_calls {
        None
    } else if message.images.is_empty() {
        Some(Content::Text(message.content))
    } else {
        let mut blocks = Vec::with_capacity(message.images.len() + 1);
        if !message.content.is_empty() {
            blocks.push(ContentBlock::Text { text: message.content });
        }
        blocks.extend(message.images.into_iter().map(|image| ContentBlock::ImageUrl {
            image_url: ImageUrl {
                url: format!("{IMAGE_DATA_PREFIX}{image}"),
                detail: None,
            },
        }));
        Some(Content::Blocks(blocks))
    };

    let mut converted = Message {
        role,
        content,
        name: None,
        assistant: None,
        tool_response: None,
    };

    if role == Role::Assistant {
        let extension = AssistantExtension {
            tool_calls: message
                .tool_calls
                .into_iter()
                .zip(0u32..)
                .map(|(call, position)| tool_call_from_ollama(call.function, position))
                .collect(),
            reasoning: message.thinking.filter(|t| !t.is_empty()),
            refusal: None,
        };
        converted.assistant = (!extension.is_empty()).then_some(extension);
    }

    if role == Role::Tool
        && let Some(name) = message.tool_name
    {
        converted.tool_response = Some(correlation::response_from_name(&name));
        converted.name = Some(name);
    }

    Some(converted)
}

/// No id is invented; Ollama correlates by name only
fn tool_call_from_ollama(function: OllamaToolCallFunction, position: u32) -> ToolCall {
    ToolCall {
        id: None,
        index: function.index.unwrap_or(position),
        function: FunctionCall::new(function.name, arguments_string(&function.arguments)),
        extra_content: None,
    }
}

// -- Inbound: Ollama wire response -> canonical response --

pub fn to_response(wire: OllamaChatResponse, model: &str) -> ChatResponse {
    let created = wire.created_at.as_deref().and_then(unix_seconds).unwrap_or_else(unix_now);

    let mut message = wire
        .message
        .and_then(message_from_ollama)
        .filter(|m| m.role == Role::Assistant)
        .unwrap_or_else(|| Message::assistant(""));
    if let Some(extension) = message.assistant.as_mut() {
        reasoning::lift(extension);
    }

    let has_tool_calls = !message.tool_calls().is_empty();

    ChatResponse {
        id: format!("ollama-{created}"),
        created,
        model: if wire.model.is_empty() { model.to_owned() } else { wire.model },
        choices: vec![Choice {
            index: 0,
            body: ChoiceBody::Message(message),
            finish_reason: wire.done.then(|| done_reason(wire.done_reason, has_tool_calls)),
        }],
        usage: usage_from_counts(wire.prompt_eval_count, wire.eval_count)
            .as_ref()
            .and_then(settle_usage),
        latency_ms: 0,
        raw: None,
    }
}

pub fn finish_reason(reason: String) -> FinishReason {
    match reason.as_str() {
        "stop" | "load" | "unload" => FinishReason::Stop,
        "length" => FinishReason::Length,
        _ => FinishReason::Other(reason),
    }
}

/// Finish reason of a final chunk, which may omit `done_reason`
fn done_reason(reason: Option<String>, has_tool_calls: bool) -> FinishReason {
    let reason = reason.map_or(FinishReason::Stop, finish_reason);
    if has_tool_calls && reason == FinishReason::Stop {
        FinishReason::ToolCalls
    } else {
        reason
    }
}

pub fn usage_from_counts(prompt: Option<u64>, completion: Option<u64>) -> Option<Usage> {
    if prompt.is_none() && completion.is_none() {
        return None;
    }
    Some(Usage::new(prompt.unwrap_or(0), completion.unwrap_or(0)))
}

// -- Stream conversion --

/// State for converting Ollama NDJSON stream lines
///
/// Tool calls arrive whole, each taking the next tool-call index.
#[derive(Debug, Default)]
pub struct OllamaStreamState {
    next_tool_index: u32,
}

impl OllamaStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: OllamaChatResponse) -> ChunkUpdate {
        let mut update = ChunkUpdate {
            model: (!chunk.model.is_empty()).then_some(chunk.model),
            done: chunk.done,
            ..ChunkUpdate::default()
        };

        if let Some(message) = chunk.message {
            let delta = &mut update.delta;
            delta.role = message.role.parse().ok();
            delta.content = Some(message.content).filter(|c| !c.is_empty());
            delta.reasoning = message.thinking.filter(|t| !t.is_empty());

            for call in message.tool_calls {
                let function = call.function;
                delta.tool_calls.push(ToolCallDelta {
                    index: self.next_tool_index,
                    id: None,
                    name: Some(function.name),
                    arguments: Some(arguments_string(&function.arguments)),
                });
                self.next_tool_index += 1;
            }
        }

        if chunk.done {
            update.finish_reason = Some(done_reason(chunk.done_reason, self.next_tool_index > 0));
            update.usage = usage_from_counts(chunk.prompt_eval_count, chunk.eval_count);
        }

        update
    }
}

// -- Models --

pub fn model_list(wire: OllamaTags, provider: &str) -> ModelList {
    ModelList {
        data: wire
            .models
            .into_iter()
            .map(|tag| ModelInfo {
                id: format!("{provider}/{}", tag.name),
                owned_by: "ollama".to_owned(),
                created: tag.modified_at.as_deref().and_then(unix_seconds),
            })
            .collect(),
    }
}
