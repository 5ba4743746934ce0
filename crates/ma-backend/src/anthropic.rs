//! Anthropic Messages API client with SSE streaming support.

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use ma_protocol::{Message, Role, StreamEvent, ToolCallRequest, ToolSchema, Usage};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::sse::{SseDecoder, SseEvent};
use crate::{BackendError, ChatBackend, ChatRequest, ChatResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic API client.
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    http: Client,
}

/// Build an HTTP client with appropriate timeouts and connection limits.
fn build_http_client() -> Result<Client, BackendError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(2)
        .build()?)
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            http: build_http_client()?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    async fn send_request(&self, request: &ChatRequest) -> Result<reqwest::Response, BackendError> {
        let body = build_request(request);
        tracing::debug!(
            endpoint = %self.endpoint(),
            messages = body.messages.len(),
            "sending streaming message request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status,
                message: error_message(&body),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        let response = self.send_request(request).await?;
        collect_response(event_stream(response)).await
    }
}

/// Turn a streaming HTTP response into protocol events.
fn event_stream(response: reqwest::Response) -> impl Stream<Item = StreamEvent> + Send {
    decode_events(response.bytes_stream())
}

/// Decode raw SSE body chunks into protocol events. Chunk boundaries may
/// fall anywhere. A body that ends before `message_stop` is an error.
fn decode_events<S, E>(chunks: S) -> impl Stream<Item = StreamEvent> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display + Send,
{
    stream! {
        futures::pin_mut!(chunks);
        let mut decoder = SseDecoder::new();
        let mut processor = SseProcessor::new();

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(chunk) => {
                    for sse_event in decoder.feed(&chunk) {
                        for event in processor.process(&sse_event) {
                            yield event;
                        }
                    }
                    if processor.stopped {
                        return;
                    }
                }
                Err(e) => {
                    yield StreamEvent::Error(format!("connection dropped: {e}"));
                    return;
                }
            }
        }

        if let Some(sse_event) = decoder.finish() {
            for event in processor.process(&sse_event) {
                yield event;
            }
        }
        if !processor.stopped {
            yield StreamEvent::Error("stream ended before message_stop".to_string());
        }
    }
}

/// Fold a stream of events into one assistant message.
async fn collect_response<S>(events: S) -> Result<ChatResponse, BackendError>
where
    S: Stream<Item = StreamEvent>,
{
    let mut events = std::pin::pin!(events);
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    let mut usage: Option<Usage> = None;

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::TextDelta(t) => text.push_str(&t),
            StreamEvent::ToolUse {
                id,
                name,
                input_json,
            } => {
                let arguments = if input_json.trim().is_empty() {
                    "{}".to_string()
                } else {
                    input_json
                };
                tool_calls.push(ToolCallRequest::new(id, name, arguments));
            }
            StreamEvent::Usage {
                input_tokens,
                output_tokens,
            } => {
                // message_start carries input tokens, message_delta the final output count
                let current = usage.get_or_insert_with(Usage::default);
                if input_tokens > 0 {
                    current.prompt_tokens = input_tokens;
                }
                current.completion_tokens = output_tokens;
                current.total_tokens = current.prompt_tokens + current.completion_tokens;
            }
            StreamEvent::Error(message) => return Err(BackendError::Stream(message)),
            StreamEvent::Done => break,
        }
    }

    Ok(ChatResponse {
        message: Message::assistant_with_tool_calls(text, tool_calls),
        usage,
    })
}

fn build_request(request: &ChatRequest) -> ApiRequest {
    let system = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    ApiRequest {
        model: request.model.clone(),
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        stream: true,
        system,
        messages: build_messages(&request.messages),
        tools: request.tools.iter().map(to_api_tool).collect(),
    }
}

fn to_api_tool(tool: &ToolSchema) -> ApiTool {
    ApiTool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.parameters.clone(),
    }
}

/// Map the transcript onto Anthropic's alternating user/assistant turns.
///
/// Tool messages answering one assistant turn are grouped into a single user
/// message of `tool_result` blocks.
fn build_messages(transcript: &[Message]) -> Vec<ApiMessage> {
    let mut messages: Vec<ApiMessage> = Vec::new();

    for msg in transcript {
        match msg.role {
            Role::System => {}
            Role::User => messages.push(ApiMessage {
                role: "user".to_string(),
                content: ApiContent::Text(msg.content.clone()),
            }),
            Role::Assistant if msg.has_tool_calls() => {
                let mut blocks = Vec::new();
                if !msg.content.trim().is_empty() {
                    blocks.push(ApiContentBlock::Text {
                        text: msg.content.clone(),
                    });
                }
                for call in &msg.tool_calls {
                    let input: Value = serde_json::from_str(&call.arguments)
                        .unwrap_or(Value::Object(Default::default()));
                    blocks.push(ApiContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input,
                    });
                }
                messages.push(ApiMessage {
                    role: "assistant".to_string(),
                    content: ApiContent::Blocks(blocks),
                });
            }
            // The API rejects blank text, so a reply with nothing in it is left out
            Role::Assistant if msg.content.trim().is_empty() => {}
            Role::Assistant => messages.push(ApiMessage {
                role: "assistant".to_string(),
                content: ApiContent::Text(msg.content.clone()),
            }),
            Role::Tool => {
                let block = ApiContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: msg.content.clone(),
                };
                if let Some(ApiMessage {
                    role,
                    content: ApiContent::Blocks(blocks),
                }) = messages.last_mut()
                {
                    if role.as_str() == "user" {
                        blocks.push(block);
                        continue;
                    }
                }
                messages.push(ApiMessage {
                    role: "user".to_string(),
                    content: ApiContent::Blocks(vec![block]),
                });
            }
        }
    }

    messages
}

fn error_message(body: &str) -> String {
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

/// Tracks state across SSE events for tool_use accumulation.
///
/// Tool use blocks arrive as:
///   content_block_start (type=tool_use, id, name)
///   content_block_delta* (input_json_delta chunks)
///   content_block_stop
///
/// The message is complete only once `message_stop` arrives.
struct SseProcessor {
    active_tool: Option<ToolAccumulator>,
    stopped: bool,
}

struct ToolAccumulator {
    id: String,
    name: String,
    input_json: String,
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

impl SseProcessor {
    fn new() -> Self {
        Self {
            active_tool: None,
            stopped: false,
        }
    }

    fn process(&mut self, event: &SseEvent) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        let data: Value = match serde_json::from_str(&event.data) {
            Ok(v) => v,
            Err(_) => return events,
        };

        match event.event_type.as_deref().unwrap_or("") {
            "message_start" => {
                if let Some(usage) = data.get("message").and_then(|m| m.get("usage")) {
                    let input = usage.get("input_tokens").and_then(|v| v.as_u64());
                    let output = usage.get("output_tokens").and_then(|v| v.as_u64());
                    if let (Some(input), Some(output)) = (input, output) {
                        events.push(StreamEvent::Usage {
                            input_tokens: input as u32,
                            output_tokens: output as u32,
                        });
                    }
                }
            }
            "content_block_start" => {
                if let Some(block) = data.get("content_block") {
                    if block.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
                        self.active_tool = Some(ToolAccumulator {
                            id: str_field(block, "id"),
                            name: str_field(block, "name"),
                            input_json: String::new(),
                        });
                    }
                }
            }
            "content_block_delta" => {
                if let Some(delta) = data.get("delta") {
                    match delta.get("type").and_then(|t| t.as_str()).unwrap_or("") {
                        "text_delta" => {
                            if let Some(text) = delta.get("text").and_then(|t| t.as_str()) {
                                events.push(StreamEvent::TextDelta(text.to_string()));
                            }
                        }
                        "input_json_delta" => {
                            if let (Some(partial), Some(tool)) = (
                                delta.get("partial_json").and_then(|t| t.as_str()),
                                self.active_tool.as_mut(),
                            ) {
                                tool.input_json.push_str(partial);
                            }
                        }
                        _ => {}
                    }
                }
            }
            "content_block_stop" => {
                if let Some(tool) = self.active_tool.take() {
                    events.push(StreamEvent::ToolUse {
                        id: tool.id,
                        name: tool.name,
                        input_json: tool.input_json,
                    });
                }
            }
            "message_delta" => {
                if let Some(output) = data
                    .get("usage")
                    .and_then(|u| u.get("output_tokens"))
                    .and_then(|v| v.as_u64())
                {
                    events.push(StreamEvent::Usage {
                        input_tokens: 0,
                        output_tokens: output as u32,
                    });
                }
            }
            "message_stop" => {
                self.stopped = true;
                events.push(StreamEvent::Done);
            }
            "error" => {
                let message = data
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("Unknown error")
                    .to_string();
                events.push(StreamEvent::Error(message));
            }
            _ => {}
        }

        events
    }
}

// API request types

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ApiContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ApiContentBlock>),
}
