//! OpenAI-compatible chat completions client.
//!
//! Works against any endpoint speaking the `/chat/completions` dialect
//! (OpenAI, Groq, DeepSeek, local gateways).

use std::time::Duration;

use async_trait::async_trait;
use ma_protocol::{Message, Role, ToolCallRequest, ToolSchema, Usage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{BackendError, ChatBackend, ChatRequest, ChatResponse};

/// Client for an OpenAI-compatible endpoint.
pub struct OpenAiClient {
    name: String,
    api_key: String,
    base_url: String,
    http: Client,
}

fn build_http_client() -> Result<Client, BackendError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(2)
        .build()?)
}

impl OpenAiClient {
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            http: build_http_client()?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatBackend for OpenAiClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        let body = build_request(request);
        tracing::debug!(
            endpoint = %self.endpoint(),
            messages = body.messages.len(),
            "sending chat completion"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        let decoded: ApiResponse = serde_json::from_str(&text)?;
        if let Some(error) = decoded.error {
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: error.message,
            });
        }
        parse_response(decoded)
    }
}

fn build_request(request: &ChatRequest) -> ApiRequest {
    let tools: Vec<ApiTool> = request.tools.iter().map(to_api_tool).collect();
    let tool_choice = if tools.is_empty() {
        None
    } else {
        Some("auto".to_string())
    };

    ApiRequest {
        model: request.model.clone(),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        messages: request.messages.iter().map(to_api_message).collect(),
        tools,
        tool_choice,
    }
}

fn to_api_tool(tool: &ToolSchema) -> ApiTool {
    ApiTool {
        kind: "function".to_string(),
        function: ApiFunctionSchema {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

fn to_api_message(message: &Message) -> ApiMessage {
    let tool_calls: Vec<ApiToolCall> = message
        .tool_calls
        .iter()
        .map(|call| ApiToolCall {
            id: call.id.clone(),
            kind: "function".to_string(),
            function: ApiFunction {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        })
        .collect();

    // An assistant turn that only calls tools is sent with null content.
    let content = if message.role == Role::Assistant
        && !tool_calls.is_empty()
        && message.content.is_empty()
    {
        None
    } else {
        Some(message.content.clone())
    };

    ApiMessage {
        role: message.role.as_str().to_string(),
        content,
        tool_call_id: message.tool_call_id.clone(),
        tool_calls,
    }
}

fn parse_response(decoded: ApiResponse) -> Result<ChatResponse, BackendError> {
    let choice = decoded
        .choices
        .into_iter()
        .next()
        .ok_or(BackendError::EmptyResponse)?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter(|call| call.kind == "function")
        .map(|call| {
            let arguments = if call.function.arguments.trim().is_empty() {
                "{}".to_string()
            } else {
                call.function.arguments
            };
            ToolCallRequest::new(call.id, call.function.name, arguments)
        })
        .collect();

    let content = choice.message.content.unwrap_or_default();
    Ok(ChatResponse {
        message: Message::assistant_with_tool_calls(content, tool_calls),
        usage: decoded
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens)),
    })
}

/// Pull `error.message` out of an error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

// API request/response types

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: ApiFunction,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    kind: String,
    function: ApiFunctionSchema,
}

#[derive(Debug, Serialize)]
struct ApiFunctionSchema {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}
