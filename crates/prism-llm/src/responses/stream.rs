use std::pin::Pin;

use futures_util::{Stream, StreamExt, stream};
use prism_core::CanonicalError;

use crate::convert::unix_now;
use crate::stream::EventStream;
use crate::types::{Role, StreamEvent, ToolCallDelta};

use super::convert::status;
use super::types::{
    OutputContent, OutputItem, ResponseStatus, ResponsesEvent, ResponsesResponse, ResponsesStreamEvent,
    ResponsesUsage, SummaryPart,
};

/// Responses API events as the caller receives them
pub type ResponsesEventStream = Pin<Box<dyn Stream<Item = Result<ResponsesStreamEvent, CanonicalError>> + Send>>;

/// Re-express a canonical chat stream as Responses API events
///
/// Errors pass through unchanged and end the stream the same way.
pub fn responses_events(events: EventStream) -> ResponsesEventStream {
    let mut state = ResponsesStreamState::new();

    Box::pin(events.flat_map(move |item| {
        let batch: Vec<_> = match item {
            Ok(event) => state.push(&event).into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
        stream::iter(batch)
    }))
}

struct OpenReasoning {
    item_id: String,
    output_index: u32,
    text: String,
}

struct OpenMessage {
    item_id: String,
    output_index: u32,
    text: Option<String>,
    refusal: String,
}

struct OpenCall {
    delta_index: u32,
    item_id: String,
    output_index: u32,
    call_id: String,
    name: String,
    arguments: String,
}

/// Folds canonical stream events into Responses API events
///
/// Output items open lazily on their first content and close in the order
/// reasoning, message, function calls. The terminal chat event closes
/// whatever is still open and becomes `response.completed`, or
/// `response.incomplete` when the model stopped early.
pub struct ResponsesStreamState {
    response_id: String,
    model: String,
    created_at: u64,
    sequence_number: u64,
    next_output_index: u32,
    started: bool,
    finished: bool,
    reasoning: Option<OpenReasoning>,
    message: Option<OpenMessage>,
    calls: Vec<OpenCall>,
    output: Vec<(u32, OutputItem)>,
}

impl Default for ResponsesStreamState {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponsesStreamState {
    pub fn new() -> Self {
        Self {
            response_id: String::new(),
            model: String::new(),
            created_at: unix_now(),
            sequence_number: 0,
            next_output_index: 0,
            started: false,
            finished: false,
            reasoning: None,
            message: None,
            calls: Vec::new(),
            output: Vec::new(),
        }
    }

    /// Events produced by one canonical event, in order
    pub fn push(&mut self, event: &StreamEvent) -> Vec<ResponsesStreamEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }

        if !self.started {
            self.started = true;
            self.model.clone_from(&event.model);
            self.response_id = event
                .id
                .clone()
                .unwrap_or_else(|| format!("resp_{}_{}", self.created_at, event.chunk_index));
            let response = self.snapshot(ResponseStatus::InProgress, None);
            self.emit(&mut out, ResponsesEvent::Created {
                response: Box::new(response),
            });
        }

        let delta = &event.delta;
        if let Some(reasoning) = delta.reasoning.as_deref().filter(|r| !r.is_empty()) {
            self.reasoning_delta(&mut out, reasoning);
        }
        if let Some(text) = delta.content.as_deref().filter(|t| !t.is_empty()) {
            self.text_delta(&mut out, text);
        }
        if let Some(refusal) = delta.refusal.as_deref().filter(|r| !r.is_empty()) {
            self.close_reasoning(&mut out);
            self.open_message(&mut out).refusal.push_str(refusal);
        }
        for call in &delta.tool_calls {
            self.call_delta(&mut out, call);
        }

        if event.is_terminal {
            self.finish(&mut out, event);
        }
        out
    }

    fn emit(&mut self, out: &mut Vec<ResponsesStreamEvent>, event: ResponsesEvent) {
        out.push(ResponsesStreamEvent {
            sequence_number: self.sequence_number,
            event,
        });
        self.sequence_number += 1;
    }

    fn next_output_index(&mut self) -> u32 {
        let index = self.next_output_index;
        self.next_output_index += 1;
        index
    }

    fn reasoning_delta(&mut self, out: &mut Vec<ResponsesStreamEvent>, delta: &str) {
        let open = match self.reasoning.take() {
            Some(open) => open,
            None => {
                let output_index = self.next_output_index();
                let item_id = format!("rs_{}_{output_index}", self.response_id);
                self.emit(out, ResponsesEvent::OutputItemAdded {
                    output_index,
                    item: OutputItem::Reasoning {
                        id: item_id.clone(),
                        summary: Vec::new(),
                    },
                });
                OpenReasoning {
                    item_id,
                    output_index,
                    text: String::new(),
                }
            }
        };

        let event = ResponsesEvent::ReasoningSummaryTextDelta {
            item_id: open.item_id.clone(),
            output_index: open.output_index,
            summary_index: 0,
            delta: delta.to_owned(),
        };
        self.emit(out, event);
        self.reasoning.insert(open).text.push_str(delta);
    }

    fn open_message(&mut self, out: &mut Vec<ResponsesStreamEvent>) -> &mut OpenMessage {
        let open = match self.message.take() {
            Some(open) => open,
            None => {
                let output_index = self.next_output_index();
                let item_id = format!("msg_{}_{output_index}", self.response_id);
                self.emit(out, ResponsesEvent::OutputItemAdded {
                    output_index,
                    item: OutputItem::Message {
                        id: item_id.clone(),
                        role: Role::Assistant,
                        status: ResponseStatus::InProgress,
                        content: Vec::new(),
                    },
                });
                OpenMessage {
                    item_id,
                    output_index,
                    text: None,
                    refusal: String::new(),
                }
            }
        };

        self.message.insert(open)
    }

    fn text_delta(&mut self, out: &mut Vec<ResponsesStreamEvent>, delta: &str) {
        self.close_reasoning(out);

        let open = self.open_message(out);
        let item_id = open.item_id.clone();
        let output_index = open.output_index;
        let first = open.text.is_none();
        open.text.get_or_insert_with(String::new).push_str(delta);

        if first {
            self.emit(out, ResponsesEvent::ContentPartAdded {
                item_id: item_id.clone(),
                output_index,
                content_index: 0,
                part: OutputContent::text(""),
            });
        }
        self.emit(out, ResponsesEvent::OutputTextDelta {
            item_id,
            output_index,
            content_index: 0,
            delta: delta.to_owned(),
        });
    }

    fn call_delta(&mut self, out: &mut Vec<ResponsesStreamEvent>, delta: &ToolCallDelta) {
        self.close_reasoning(out);
        self.close_message(out, ResponseStatus::Completed);

        let position = match self.calls.iter().position(|c| c.delta_index == delta.index) {
            Some(position) => position,
            None => {
                let output_index = self.next_output_index();
                let call_id = delta
                    .id
                    .clone()
                    .or_else(|| delta.name.clone())
                    .unwrap_or_else(|| format!("call_{}", delta.index));
                let name = delta.name.clone().unwrap_or_default();
                let item_id = format!("fc_{call_id}");

                self.emit(out, ResponsesEvent::OutputItemAdded {
                    output_index,
                    item: OutputItem::FunctionCall {
                        id: item_id.clone(),
                        call_id: call_id.clone(),
                        name: name.clone(),
                        arguments: String::new(),
                        status: ResponseStatus::InProgress,
                    },
                });
                self.calls.push(OpenCall {
                    delta_index: delta.index,
                    item_id,
                    output_index,
                    call_id,
                    name,
                    arguments: String::new(),
                });
                self.calls.len() - 1
            }
        };

        let Some(arguments) = delta.arguments.as_deref().filter(|a| !a.is_empty()) else {
            return;
        };
        let call = &mut self.calls[position];
        call.arguments.push_str(arguments);
        let event = ResponsesEvent::FunctionCallArgumentsDelta {
            item_id: call.item_id.clone(),
            output_index: call.output_index,
            delta: arguments.to_owned(),
        };
        self.emit(out, event);
    }

    fn close_reasoning(&mut self, out: &mut Vec<ResponsesStreamEvent>) {
        let Some(open) = self.reasoning.take() else {
            return;
        };

        self.emit(out, ResponsesEvent::ReasoningSummaryTextDone {
            item_id: open.item_id.clone(),
            output_index: open.output_index,
            summary_index: 0,
            text: open.text.clone(),
        });
        self.close_item(out, open.output_index, OutputItem::Reasoning {
            id: open.item_id,
            summary: vec![SummaryPart::SummaryText { text: open.text }],
        });
    }

    fn close_message(&mut self, out: &mut Vec<ResponsesStreamEvent>, status: ResponseStatus) {
        let Some(open) = self.message.take() else {
            return;
        };

        let mut content = Vec::new();
        if let Some(text) = open.text {
            self.emit(out, ResponsesEvent::OutputTextDone {
                item_id: open.item_id.clone(),
                output_index: open.output_index,
                content_index: 0,
                text: text.clone(),
            });
            self.emit(out, ResponsesEvent::ContentPartDone {
                item_id: open.item_id.clone(),
                output_index: open.output_index,
                content_index: 0,
                part: OutputContent::text(text.clone()),
            });
            content.push(OutputContent::text(text));
        }
        if !open.refusal.is_empty() {
            content.push(OutputContent::Refusal { refusal: open.refusal });
        }

        self.close_item(out, open.output_index, OutputItem::Message {
            id: open.item_id,
            role: Role::Assistant,
            status,
            content,
        });
    }

    fn close_calls(&mut self, out: &mut Vec<ResponsesStreamEvent>) {
        for call in std::mem::take(&mut self.calls) {
            self.emit(out, ResponsesEvent::FunctionCallArgumentsDone {
                item_id: call.item_id.clone(),
                output_index: call.output_index,
                arguments: call.arguments.clone(),
            });
            self.close_item(out, call.output_index, OutputItem::FunctionCall {
                id: call.item_id,
                call_id: call.call_id,
                name: call.name,
                arguments: call.arguments,
                status: ResponseStatus::Completed,
            });
        }
    }

    fn close_item(&mut self, out: &mut Vec<ResponsesStreamEvent>, output_index: u32, item: OutputItem) {
        self.emit(out, ResponsesEvent::OutputItemDone {
            output_index,
            item: item.clone(),
        });
        self.output.push((output_index, item));
    }

    fn finish(&mut self, out: &mut Vec<ResponsesStreamEvent>, event: &StreamEvent) {
        let (status, incomplete_details) = status(event.finish_reason.as_ref());

        self.close_reasoning(out);
        self.close_message(out, status);
        self.close_calls(out);

        let mut response = self.snapshot(status, event.usage.map(ResponsesUsage::from));
        response.incomplete_details = incomplete_details;
        response.latency_ms = event.latency_ms;

        let response = Box::new(response);
        let terminal = match status {
            ResponseStatus::Incomplete => ResponsesEvent::Incomplete { response },
            _ => ResponsesEvent::Completed { response },
        };
        self.emit(out, terminal);
        self.finished = true;
    }

    fn snapshot(&self, status: ResponseStatus, usage: Option<ResponsesUsage>) -> ResponsesResponse {
        let mut output = self.output.clone();
        output.sort_by_key(|(index, _)| *index);

        ResponsesResponse {
            id: self.response_id.clone(),
            object: "response".to_owned(),
            created_at: self.created_at,
            model: self.model.clone(),
            status,
            incomplete_details: None,
            output: output.into_iter().map(|(_, item)| item).collect(),
            usage,
            latency_ms: 0,
        }
    }
}
