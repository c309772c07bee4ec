//! OpenAI chat-completions backend.

use crate::model::{
    Backend, ModelError, ModelReply, ModelRequest, ModelResponse, Role, ToolCall, ToolSpec, Turn,
    Usage,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ApiToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: ApiFunctionCall<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseToolCall {
    id: String,
    function: ApiResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ApiResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
}

impl OpenAiBackendBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: None,
        }
    }

    /// Point at an OpenAI-compatible endpoint (proxy, gateway, local server).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn build(self) -> OpenAiBackend {
        OpenAiBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            base_url: self.base_url,
            max_tokens: self.max_tokens,
        }
    }
}

/// OpenAI chat-completions backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
}

impl OpenAiBackend {
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(api_key, model)
    }

    /// Create a backend from the OPENAI_API_KEY environment variable.
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY not set".into()))?;
        Ok(Self::builder(api_key, model).build())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(&'a self, request: &ModelRequest<'a>) -> ApiRequest<'a> {
        let tools: Vec<Value> = request.tools.iter().map(ToolSpec::to_function).collect();
        let tool_choice = (!tools.is_empty()).then_some("auto");

        ApiRequest {
            model: &self.model,
            messages: request.turns.iter().map(turn_to_api).collect(),
            tools,
            tool_choice,
            max_tokens: self.max_tokens,
        }
    }
}

fn turn_to_api(turn: &Turn) -> ApiMessage<'_> {
    ApiMessage {
        role: role_to_api(turn.role),
        content: turn.content.as_deref(),
        tool_calls: turn
            .tool_calls
            .iter()
            .map(|call| ApiToolCall {
                id: &call.id,
                call_type: "function",
                function: ApiFunctionCall {
                    name: &call.name,
                    arguments: &call.arguments,
                },
            })
            .collect(),
        tool_call_id: turn.tool_call_id.as_deref(),
    }
}

fn role_to_api(role: Role) -> &'static str {
    role.as_str()
}

fn response_to_reply(response: ApiResponse) -> std::result::Result<ModelResponse, ModelError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::InvalidResponse("response has no choices".into()))?;

    let calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    let reply = if calls.is_empty() {
        ModelReply::Text(choice.message.content.unwrap_or_default())
    } else {
        ModelReply::ToolCalls {
            content: choice.message.content,
            calls,
        }
    };

    let usage = response
        .usage
        .map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(ModelResponse { reply, usage })
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({}, {})", self.model, self.base_url)
    }
}

impl Backend for OpenAiBackend {
    async fn call(
        &self,
        request: ModelRequest<'_>,
    ) -> std::result::Result<ModelResponse, ModelError> {
        let api_request = self.build_request(&request);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        response_to_reply(api_response)
    }
}
