use crate::types::{
    AssistantExtension, ChatParameters, ChatRequest, ChatResponse, Content, ContentBlock, FinishReason, FunctionCall,
    ImageUrl, Message, Role, ToolCall, ToolChoice, ToolDefinition, Usage,
};

use super::types::{
    IncompleteDetails, InputContent, InputItem, InputMessage, InputPart, OutputContent, OutputItem, ResponseStatus,
    ResponsesInput, ResponsesRequest, ResponsesResponse, ResponsesTool, ResponsesToolChoice, ResponsesUsage,
    SummaryPart, TypedItem,
};

impl ResponsesRequest {
    /// Chat request carrying the same conversation
    ///
    /// Consecutive `function_call` items collapse into one assistant turn, and
    /// reasoning items attach to the assistant turn they precede.
    pub fn to_chat_request(&self) -> ChatRequest {
        let mut messages = Vec::new();
        if let Some(instructions) = &self.instructions {
            messages.push(Message::system(instructions.clone()));
        }

        match &self.input {
            ResponsesInput::Text(text) => messages.push(Message::user(text.clone())),
            ResponsesInput::Items(items) => {
                for item in items {
                    push_item(&mut messages, item);
                }
            }
        }

        let tools: Vec<ToolDefinition> = self.tools.iter().filter_map(function_tool).collect();

        ChatRequest {
            model: self.model.clone(),
            messages,
            params: ChatParameters {
                temperature: self.temperature,
                top_p: self.top_p,
                max_tokens: self.max_output_tokens,
                tools: (!tools.is_empty()).then_some(tools),
                tool_choice: self.tool_choice.as_ref().map(tool_choice),
                user: self.user.clone(),
                extra: self.extra.clone(),
                ..ChatParameters::default()
            },
        }
    }
}

fn push_item(messages: &mut Vec<Message>, item: &InputItem) {
    match item {
        InputItem::Message(message) | InputItem::Typed(TypedItem::Message(message)) => push_message(messages, message),
        InputItem::Typed(TypedItem::FunctionCall {
            call_id,
            name,
            arguments,
        }) => {
            let extension = open_assistant(messages);
            let index = u32::try_from(extension.tool_calls.len()).unwrap_or(u32::MAX);
            extension.tool_calls.push(ToolCall {
                id: Some(call_id.clone().unwrap_or_else(|| name.clone())),
                index,
                function: FunctionCall::new(name.clone(), arguments.clone()),
                extra_content: None,
            });
        }
        InputItem::Typed(TypedItem::FunctionCallOutput { call_id, output }) => {
            messages.push(Message::tool_result(call_id.clone(), output.clone()));
        }
        InputItem::Typed(TypedItem::Reasoning { summary }) => {
            let text = summary_text(summary);
            if text.is_empty() {
                return;
            }
            // reasoning leads the turn, so it always opens a fresh one
            messages.push(Message {
                role: Role::Assistant,
                content: None,
                name: None,
                assistant: Some(AssistantExtension {
                    reasoning: Some(text),
                    ..AssistantExtension::default()
                }),
                tool_response: None,
            });
        }
    }
}

fn push_message(messages: &mut Vec<Message>, message: &InputMessage) {
    let content = input_content(&message.content);

    if message.role == Role::Assistant
        && let Some(last) = messages.last_mut()
        && last.role == Role::Assistant
        && last.content.is_none()
        && last.tool_calls().is_empty()
    {
        last.content = Some(content);
        return;
    }

    messages.push(Message {
        role: message.role,
        content: Some(content),
        name: None,
        assistant: None,
        tool_response: None,
    });
}

/// Assistant turn that tool calls may join, opening one when the
/// conversation does not end in an assistant turn
fn open_assistant(messages: &mut Vec<Message>) -> &mut AssistantExtension {
    let joinable = messages.last().is_some_and(|last| last.role == Role::Assistant);
    if !joinable {
        messages.push(Message::assistant_tool_calls(Vec::new()));
    }

    let last = messages.len() - 1;
    messages[last].assistant.get_or_insert_with(AssistantExtension::default)
}

fn input_content(content: &InputContent) -> Content {
    let parts = match content {
        InputContent::Text(text) => return Content::Text(text.clone()),
        InputContent::Parts(parts) => parts,
    };

    let blocks: Vec<ContentBlock> = parts
        .iter()
        .filter_map(|part| match part {
            InputPart::InputText { text } | InputPart::OutputText { text } => {
                Some(ContentBlock::Text { text: text.clone() })
            }
            InputPart::InputImage { image_url, detail } => image_url.as_ref().map(|url| ContentBlock::ImageUrl {
                image_url: ImageUrl {
                    url: url.clone(),
                    detail: detail.clone(),
                },
            }),
        })
        .collect();

    if blocks.iter().all(|block| matches!(block, ContentBlock::Text { .. })) {
        return Content::Text(Content::Blocks(blocks).as_text());
    }
    Content::Blocks(blocks)
}

fn function_tool(tool: &ResponsesTool) -> Option<ToolDefinition> {
    if tool.tool_type != "function" {
        tracing::debug!(tool_type = %tool.tool_type, "dropping tool the chat endpoint cannot serve");
        return None;
    }

    let name = tool.name.clone()?;
    Some(ToolDefinition::function(name, tool.description.clone(), tool.parameters.clone()))
}

fn tool_choice(choice: &ResponsesToolChoice) -> ToolChoice {
    match choice {
        ResponsesToolChoice::Mode(mode) => match mode.as_str() {
            "none" => ToolChoice::None,
            "required" => ToolChoice::Required,
            _ => ToolChoice::Auto,
        },
        ResponsesToolChoice::Function { name } => ToolChoice::Function(name.clone()),
    }
}

fn summary_text(summary: &[SummaryPart]) -> String {
    summary
        .iter()
        .map(|part| match part {
            SummaryPart::SummaryText { text } => text.as_str(),
        })
        .collect()
}

/// Call id a Responses client answers with, the function name when the
/// provider issued none
fn call_id(call: &ToolCall) -> String {
    call.id
        .clone()
        .or_else(|| call.function.name.clone())
        .unwrap_or_else(|| format!("call_{}", call.index))
}

/// Status and incomplete reason for a finish reason
pub(crate) fn status(finish_reason: Option<&FinishReason>) -> (ResponseStatus, Option<IncompleteDetails>) {
    let reason = match finish_reason {
        Some(FinishReason::Length) => "max_output_tokens",
        Some(FinishReason::Other(other)) if other == "content_filter" => "content_filter",
        _ => return (ResponseStatus::Completed, None),
    };

    (
        ResponseStatus::Incomplete,
        Some(IncompleteDetails {
            reason: reason.to_owned(),
        }),
    )
}

impl From<Usage> for ResponsesUsage {
    fn from(usage: Usage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

impl From<ChatResponse> for ResponsesResponse {
    fn from(response: ChatResponse) -> Self {
        let choice = response.choices.first();
        let (status, incomplete_details) = status(choice.and_then(|c| c.finish_reason.as_ref()));

        let mut output = Vec::new();
        if let Some(message) = response.first_message() {
            if let Some(reasoning) = message.reasoning().filter(|r| !r.is_empty()) {
                output.push(OutputItem::Reasoning {
                    id: format!("rs_{}", response.id),
                    summary: vec![SummaryPart::SummaryText {
                        text: reasoning.to_owned(),
                    }],
                });
            }

            let mut content = Vec::new();
            if let Some(text) = message.text().filter(|t| !t.is_empty()) {
                content.push(OutputContent::text(text));
            }
            if let Some(refusal) = message.assistant.as_ref().and_then(|a| a.refusal.clone()) {
                content.push(OutputContent::Refusal { refusal });
            }
            if !content.is_empty() {
                output.push(OutputItem::Message {
                    id: format!("msg_{}", response.id),
                    role: Role::Assistant,
                    status,
                    content,
                });
            }

            for call in message.tool_calls() {
                let call_id = call_id(call);
                output.push(OutputItem::FunctionCall {
                    id: format!("fc_{call_id}"),
                    call_id,
                    name: call.function.name.clone().unwrap_or_default(),
                    arguments: call.function.arguments.clone(),
                    status: ResponseStatus::Completed,
                });
            }
        }

        Self {
            id: response.id,
            object: "response".to_owned(),
            created_at: response.created,
            model: response.model,
            status,
            incomplete_details,
            output,
            usage: response.usage.map(ResponsesUsage::from),
            latency_ms: response.latency_ms,
        }
    }
}
