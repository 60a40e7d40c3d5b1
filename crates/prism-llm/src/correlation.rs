//! Tool-call correlation between id-based and name-based providers
//!
//! Id-correlated providers answer a tool call by echoing its opaque id.
//! Name-correlated providers only know the function name, so a tool response
//! headed their way must be resolved to a name using the assistant turns
//! that came before it. Parallel calls to the same function stay ambiguous
//! on those providers; no ids are invented to hide that.

use std::collections::HashMap;

use crate::types::{Message, Role, ToolResponse};

/// Transient tool-call id to function name map for one message list
#[derive(Debug, Default)]
pub struct ToolNameMap<'a> {
    names: HashMap<&'a str, &'a str>,
}

impl<'a> ToolNameMap<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the tool calls of an assistant message
    ///
    /// Call this while walking messages in order so that lookups only see
    /// calls made before the response being resolved.
    pub fn record(&mut self, message: &'a Message) {
        if message.role != Role::Assistant {
            return;
        }

        for call in message.tool_calls() {
            if let (Some(id), Some(name)) = (call.id.as_deref(), call.function.name.as_deref()) {
                self.names.insert(id, name);
            }
        }
    }

    pub fn lookup(&self, id: &str) -> Option<&'a str> {
        self.names.get(id).copied()
    }

    /// Function name a tool response refers to
    ///
    /// An explicit name wins, then the referenced id is looked up. `None`
    /// means a name-correlated provider cannot interpret the response.
    pub fn resolve<'m>(&self, message: &'m Message) -> Option<&'m str>
    where
        'a: 'm,
    {
        let explicit = message
            .tool_response
            .as_ref()
            .and_then(|r| r.name.as_deref())
            .or(message.name.as_deref())
            .filter(|name| !name.is_empty());

        if explicit.is_some() {
            return explicit;
        }

        let id = message.tool_response.as_ref().and_then(|r| r.id.as_deref())?;
        self.lookup(id)
    }
}

/// Canonical tool-response fields for a message from a name-correlated
/// provider
///
/// The function name doubles as the call id. This is lossy when one turn
/// calls the same function twice, and that is accepted.
pub fn response_from_name(name: &str) -> ToolResponse {
    ToolResponse {
        id: Some(name.to_owned()),
        name: Some(name.to_owned()),
    }
}
