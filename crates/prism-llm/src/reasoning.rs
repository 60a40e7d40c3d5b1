//! Carrying reasoning text through tool-call-shaped legs
//!
//! Some conversions only have room for tool calls. Reasoning then rides in
//! the `extra_content` of the first tool call, or in a sentinel placeholder
//! call when the turn has no real calls. [`lift`] undoes this and must run
//! before tool calls reach a consumer or a provider.

use serde_json::{Map, Value};

use crate::types::{AssistantExtension, FunctionCall, ToolCall};

/// Function name of the placeholder call that only carries reasoning
pub const PLACEHOLDER_NAME: &str = "_thinking_placeholder";

const THINKING_KEY: &str = "thinking";

/// Whether a tool call is the reasoning placeholder
pub fn is_placeholder(call: &ToolCall) -> bool {
    call.function.name.as_deref() == Some(PLACEHOLDER_NAME)
}

/// Move `reasoning` into tool-call extension data under `namespace`
///
/// Uses the first real tool call when there is one, otherwise appends a
/// placeholder call with empty-object arguments.
pub fn stash(extension: &mut AssistantExtension, namespace: &str) {
    let Some(reasoning) = extension.reasoning.take().filter(|r| !r.is_empty()) else {
        return;
    };

    if let Some(first) = extension.tool_calls.first_mut() {
        let extra = first.extra_content.get_or_insert_with(|| Value::Object(Map::new()));
        if !extra.is_object() {
            *extra = Value::Object(Map::new());
        }
        if let Value::Object(namespaces) = extra {
            let slot = namespaces
                .entry(namespace.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(payload) = slot {
                payload.insert(THINKING_KEY.to_owned(), Value::String(reasoning));
            }
        }
        return;
    }

    let mut payload = Map::new();
    payload.insert(THINKING_KEY.to_owned(), Value::String(reasoning));

    let mut extra = Map::new();
    extra.insert(namespace.to_owned(), Value::Object(payload));

    extension.tool_calls.push(ToolCall {
        id: None,
        index: 0,
        function: FunctionCall::new(PLACEHOLDER_NAME, "{}"),
        extra_content: Some(Value::Object(extra)),
    });
}

/// Strip placeholder calls and move stashed reasoning back into the
/// `reasoning` field
///
/// Reasoning already present on the extension is kept. Real tool calls keep
/// any extension data unrelated to reasoning.
pub fn lift(extension: &mut AssistantExtension) {
    let mut recovered = None;

    extension.tool_calls.retain_mut(|call| {
        if let Some(thinking) = take_thinking(call) {
            recovered.get_or_insert(thinking);
        }
        !is_placeholder(call)
    });

    if extension.reasoning.is_none() {
        extension.reasoning = recovered;
    }
}

/// Remove and return the first non-empty thinking payload of a call
fn take_thinking(call: &mut ToolCall) -> Option<String> {
    let Some(Value::Object(namespaces)) = call.extra_content.as_mut() else {
        return None;
    };

    let mut found = None;
    let mut emptied = Vec::new();
    for (name, payload) in namespaces.iter_mut() {
        if let Value::Object(payload) = payload
            && matches!(payload.get(THINKING_KEY), Some(Value::String(_)))
            && let Some(Value::String(thinking)) = payload.remove(THINKING_KEY)
        {
            if payload.is_empty() {
                emptied.push(name.clone());
            }
            if !thinking.is_empty() {
                found.get_or_insert(thinking);
            }
        }
    }

    // Only namespaces that held nothing but the reasoning go away
    for name in &emptied {
        namespaces.remove(name);
    }
    if !emptied.is_empty() && namespaces.is_empty() {
        call.extra_content = None;
    }

    found
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn real_call() -> ToolCall {
        ToolCall {
            id: None,
            index: 0,
            function: FunctionCall::new("search", r#"{"q":"rust"}"#),
            extra_content: None,
        }
    }

    #[test]
    fn placeholder_created_without_real_calls() {
        let mut extension = AssistantExtension {
            reasoning: Some("because X".to_owned()),
            ..AssistantExtension::default()
        };

        stash(&mut extension, "ollama");

        assert_eq!(extension.reasoning, None);
        assert_eq!(extension.tool_calls.len(), 1);
        let placeholder = &extension.tool_calls[0];
        assert!(is_placeholder(placeholder));
        assert_eq!(placeholder.function.arguments, "{}");
        assert_eq!(placeholder.extra_content, Some(json!({"ollama": {"thinking": "because X"}})));
    }

    #[test]
    fn first_real_call_carries_reasoning() {
        let mut extension = AssistantExtension {
            tool_calls: vec![real_call(), real_call()],
            reasoning: Some("plan".to_owned()),
            refusal: None,
        };

        stash(&mut extension, "ollama");

        assert_eq!(extension.tool_calls.len(), 2);
        assert!(extension.tool_calls.iter().all(|c| !is_placeholder(c)));
        assert_eq!(
            extension.tool_calls[0].extra_content,
            Some(json!({"ollama": {"thinking": "plan"}}))
        );
        assert_eq!(extension.tool_calls[1].extra_content, None);
    }

    #[test]
    fn lift_reverses_stash_exactly() {
        let reasoning = "line one\n  line two with \"quotes\" and ünïcödé";
        for calls in [vec![], vec![real_call()]] {
            let original = AssistantExtension {
                tool_calls: calls,
                reasoning: Some(reasoning.to_owned()),
                refusal: None,
            };

            let mut carried = original.clone();
            stash(&mut carried, "ollama");
            lift(&mut carried);

            assert_eq!(carried, original);
        }
    }

    #[test]
    fn lift_keeps_unrelated_extension_data() {
        let mut call = real_call();
        call.extra_content = Some(json!({"google": {"thought_signature": "abc"}, "ollama": {"thinking": "t"}}));
        let mut extension = AssistantExtension {
            tool_calls: vec![call],
            ..AssistantExtension::default()
        };

        lift(&mut extension);

        assert_eq!(extension.reasoning.as_deref(), Some("t"));
        assert_eq!(
            extension.tool_calls[0].extra_content,
            Some(json!({"google": {"thought_signature": "abc"}}))
        );
    }

    #[test]
    fn round_trip_keeps_other_namespaces_intact() {
        let mut call = real_call();
        call.extra_content = Some(json!({"google": {}, "ollama": {"keep": 1}}));
        let original = AssistantExtension {
            tool_calls: vec![call],
            reasoning: Some("plan".to_owned()),
            refusal: None,
        };

        let mut carried = original.clone();
        stash(&mut carried, "ollama");
        assert_eq!(
            carried.tool_calls[0].extra_content,
            Some(json!({"google": {}, "ollama": {"keep": 1, "thinking": "plan"}}))
        );

        lift(&mut carried);
        assert_eq!(carried, original);
    }

    #[test]
    fn lift_drops_placeholder_without_payload() {
        let mut extension = AssistantExtension {
            tool_calls: vec![ToolCall {
                id: None,
                index: 0,
                function: FunctionCall::new(PLACEHOLDER_NAME, "{}"),
                extra_content: None,
            }],
            ..AssistantExtension::default()
        };

        lift(&mut extension);

        assert!(extension.is_empty());
    }

    #[test]
    fn empty_reasoning_is_not_stashed() {
        let mut extension = AssistantExtension {
            reasoning: Some(String::new()),
            ..AssistantExtension::default()
        };

        stash(&mut extension, "ollama");

        assert!(extension.tool_calls.is_empty());
    }
}
