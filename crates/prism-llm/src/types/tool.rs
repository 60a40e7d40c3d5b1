use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool/function call requested by the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque identifier, absent for providers that never issue one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Position among the parallel calls of this turn
    #[serde(default)]
    pub index: u32,
    pub function: FunctionCall,
    /// Provider-keyed auxiliary payload that has no slot elsewhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_content: Option<Value>,
}

/// Function name and arguments within a tool call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name; never filled in when the provider omitted it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Arguments as sent by the model, normally JSON
    #[serde(default)]
    pub arguments: String,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            arguments: arguments.into(),
        }
    }

    /// A call with neither a name nor arguments carries nothing to act on
    pub fn is_empty(&self) -> bool {
        self.name.as_deref().is_none_or(str::is_empty) && self.arguments.trim().is_empty()
    }
}

/// Definition of a tool the model can call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool type (currently always "function")
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

fn function_type() -> String {
    "function".to_owned()
}

impl ToolDefinition {
    pub fn function(name: impl Into<String>, description: Option<String>, parameters: Option<Value>) -> Self {
        Self {
            tool_type: function_type(),
            function: FunctionDefinition {
                name: name.into(),
                description,
                parameters,
            },
        }
    }
}

/// Specification of a callable function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the function parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// How the model should select tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model will not call any tools
    None,
    /// Model decides whether to call tools
    Auto,
    /// Model must call at least one tool
    Required,
    /// Model must call this function
    Function(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_call_detection() {
        assert!(FunctionCall::default().is_empty());
        assert!(
            FunctionCall {
                name: Some(String::new()),
                arguments: "  ".to_owned()
            }
            .is_empty()
        );
        assert!(
            !FunctionCall {
                name: None,
                arguments: "{\"q\":1}".to_owned()
            }
            .is_empty()
        );
        assert!(!FunctionCall::new("lookup", "").is_empty());
    }

    #[test]
    fn missing_name_is_not_defaulted() {
        let call: ToolCall = serde_json::from_str(r#"{"index":1,"function":{"arguments":"{}"}}"#).unwrap();
        assert_eq!(call.function.name, None);
        assert_eq!(call.id, None);
        assert_eq!(call.index, 1);
    }
}
