//! ma-backend: Model provider adapters for minagent.
//!
//! Every provider implements [`ChatBackend`]: the full transcript plus the
//! tool declarations go in, one assistant message comes out. Failures are
//! returned as [`BackendError`] values so the caller can abandon a single turn
//! without tearing down the session.

pub mod anthropic;
pub mod error;
pub mod mock;
pub mod openai;
pub mod sse;

use async_trait::async_trait;
use ma_protocol::{Message, ToolSchema, Usage};

pub use anthropic::AnthropicClient;
pub use error::BackendError;
pub use mock::{MockBackend, MockResponse};
pub use openai::OpenAiClient;

/// A completion request: the transcript replayed verbatim plus static tool
/// declarations and sampling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.7,
            max_tokens: 4096,
            messages,
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// The assistant message produced for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    /// Always has `Role::Assistant`; may carry zero or more tool calls.
    pub message: Message,
    pub usage: Option<Usage>,
}

/// Boundary to a remote completion endpoint.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short provider label for banners and logs.
    fn name(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError>;
}
