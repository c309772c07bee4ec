//! Core conversation types (provider-agnostic).
//!
//! These types describe the transcript and tool surface shared by every
//! gateway. Provider wire formats live in `providers`.

use super::errors::ModelError;
use crate::tools::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::future::Future;

/// Role of a transcript participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier used to correlate the result turn.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Raw JSON argument text, exactly as the model produced it.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the argument text into a JSON object.
    ///
    /// Anything that is not a JSON object is rejected so that free text never
    /// reaches a tool executable.
    pub fn parse_arguments(&self) -> Result<Map<String, Value>, ToolError> {
        match serde_json::from_str::<Value>(&self.arguments) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ToolError::MalformedArguments(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(ToolError::MalformedArguments(e.to_string())),
        }
    }
}

/// One entry in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    /// Text content; absent when an assistant turn only carries tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Requested invocations, only on assistant turns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Links a tool-result turn back to its request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Set on tool-result turns whose invocation failed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Turn {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            is_error: false,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// An assistant turn that records the model's tool requests verbatim.
    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: calls,
            tool_call_id: None,
            tool_name: None,
            is_error: false,
        }
    }

    /// A tool-role turn carrying the outcome of `call`.
    ///
    /// Successful values are stored as compact JSON; failures as
    /// `{"error": "<message>"}`.
    pub fn tool_result(call: &ToolCall, outcome: &Result<Value, ToolError>) -> Self {
        let (content, is_error) = match outcome {
            Ok(value) => (value.to_string(), false),
            Err(e) => (json!({ "error": e.to_string() }).to_string(), true),
        };
        Self {
            role: Role::Tool,
            content: Some(content),
            tool_calls: Vec::new(),
            tool_call_id: Some(call.id.clone()),
            tool_name: Some(call.name.clone()),
            is_error,
        }
    }

    /// Text content, or an empty string.
    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// JSON type of a declared tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Whether `value` has this JSON type.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
}

/// Static description of a callable tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Add a required parameter.
    pub fn required(
        self,
        name: impl Into<String>,
        kind: ParamKind,
        description: impl Into<String>,
    ) -> Self {
        self.param(name, kind, description, true)
    }

    /// Add an optional parameter.
    pub fn optional(
        self,
        name: impl Into<String>,
        kind: ParamKind,
        description: impl Into<String>,
    ) -> Self {
        self.param(name, kind, description, false)
    }

    fn param(
        mut self,
        name: impl Into<String>,
        kind: ParamKind,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            description: description.into(),
            required,
        });
        self
    }

    /// JSON schema of the argument object.
    pub fn parameters_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    json!({ "type": p.kind.as_str(), "description": p.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Function-calling shape sent to the gateway.
    pub fn to_function(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters_schema(),
            },
        })
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Everything the gateway needs for one call.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub turns: &'a [Turn],
    pub tools: &'a [ToolSpec],
}

/// What the model decided to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    /// A final, user-visible answer.
    Text(String),
    /// One or more tool invocations, optionally with accompanying text.
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::ToolCalls {
            content: None,
            calls,
        }
    }

    /// Collapse a tool-call reply that requests nothing into plain text.
    pub fn normalize(self) -> Self {
        match self {
            Self::ToolCalls { content, calls } if calls.is_empty() => {
                Self::Text(content.unwrap_or_default())
            }
            other => other,
        }
    }
}

/// A reply together with its usage accounting.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub reply: ModelReply,
    pub usage: Usage,
}

impl From<ModelReply> for ModelResponse {
    fn from(reply: ModelReply) -> Self {
        Self {
            reply,
            usage: Usage::default(),
        }
    }
}

/// Boundary to the language model.
///
/// From the agent's point of view a backend is a function of
/// `(transcript, tool specs)`; transport retries are its own business.
pub trait Backend: Send + Sync {
    fn call(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelResponse, ModelError>> + Send;
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_must_be_an_object() {
        let ok = ToolCall::new("1", "search_artist", r#"{"query":"Banksy"}"#);
        assert_eq!(ok.parse_arguments().unwrap()["query"], "Banksy");

        let text = ToolCall::new("2", "search_artist", "Banksy please");
        assert!(matches!(
            text.parse_arguments(),
            Err(ToolError::MalformedArguments(_))
        ));

        let array = ToolCall::new("3", "search_artist", r#"["Banksy"]"#);
        let err = array.parse_arguments().unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn tool_result_turn_links_back_to_call() {
        let call = ToolCall::new("call_9", "search_gene", "{}");
        let turn = Turn::tool_result(&call, &Ok(json!({ "name": "Pop Art" })));
        assert_eq!(turn.role, Role::Tool);
        assert_eq!(turn.tool_call_id.as_deref(), Some("call_9"));
        assert_eq!(turn.tool_name.as_deref(), Some("search_gene"));
        assert_eq!(turn.content_str(), r#"{"name":"Pop Art"}"#);
        assert!(!turn.is_error);
    }

    #[test]
    fn failed_tool_result_carries_error_payload() {
        let call = ToolCall::new("call_1", "missing", "{}");
        let turn = Turn::tool_result(&call, &Err(ToolError::NotFound("missing".into())));
        assert!(turn.is_error);
        let payload: Value = serde_json::from_str(turn.content_str()).unwrap();
        assert_eq!(payload["error"], "tool not found: missing");
    }

    #[test]
    fn spec_renders_function_shape() {
        let spec = ToolSpec::new("search_gene", "Look up a gene")
            .required("query", ParamKind::String, "Gene to search for")
            .optional("limit", ParamKind::Integer, "Maximum results");

        let function = spec.to_function();
        assert_eq!(function["type"], "function");
        assert_eq!(function["function"]["name"], "search_gene");
        let params = &function["function"]["parameters"];
        assert_eq!(params["type"], "object");
        assert_eq!(params["properties"]["query"]["type"], "string");
        assert_eq!(params["properties"]["limit"]["type"], "integer");
        assert_eq!(params["required"], json!(["query"]));
    }

    #[test]
    fn empty_tool_call_reply_normalizes_to_text() {
        let reply = ModelReply::ToolCalls {
            content: Some("done".into()),
            calls: Vec::new(),
        };
        assert_eq!(reply.normalize(), ModelReply::text("done"));

        let reply = ModelReply::tool_calls(vec![ToolCall::new("1", "a", "{}")]);
        assert!(matches!(reply.normalize(), ModelReply::ToolCalls { .. }));
    }

    #[test]
    fn param_kinds_check_values() {
        assert!(ParamKind::Integer.accepts(&json!(3)));
        assert!(!ParamKind::Integer.accepts(&json!(3.5)));
        assert!(ParamKind::Number.accepts(&json!(3.5)));
        assert!(!ParamKind::String.accepts(&json!(null)));
    }
}
