//! Mock provider for testing.
//!
//! Replays a scripted sequence of responses and records every request it
//! receives, allowing tests at every layer to use the mock instead of real HTTP.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use ma_protocol::{Message, ToolCallRequest, Usage};

use crate::{BackendError, ChatBackend, ChatRequest, ChatResponse};

/// One scripted outcome.
#[derive(Debug)]
pub enum MockResponse {
    /// Reply with this assistant message.
    Reply {
        message: Message,
        usage: Option<Usage>,
    },
    /// Fail the request with an API error.
    Fail { status: u16, message: String },
}

/// Backend that replays [`MockResponse`]s in order.
#[derive(Debug, Default)]
pub struct MockBackend {
    script: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: Vec<MockResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a plain text reply.
    pub fn then_text(self, text: &str) -> Self {
        self.push(MockResponse::Reply {
            message: Message::assistant(text),
            usage: None,
        })
    }

    /// Queue a reply carrying tool calls.
    pub fn then_tool_calls(self, text: &str, calls: Vec<ToolCallRequest>) -> Self {
        self.push(MockResponse::Reply {
            message: Message::assistant_with_tool_calls(text, calls),
            usage: None,
        })
    }

    /// Queue a failed request.
    pub fn then_error(self, status: u16, message: &str) -> Self {
        self.push(MockResponse::Fail {
            status,
            message: message.to_string(),
        })
    }

    fn push(self, response: MockResponse) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(response);
        }
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Number of scripted responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());

        match next {
            Some(MockResponse::Reply { message, usage }) => Ok(ChatResponse { message, usage }),
            Some(MockResponse::Fail { status, message }) => {
                Err(BackendError::Api { status, message })
            }
            None => Err(BackendError::ScriptExhausted),
        }
    }
}

/// Built-in test fixtures for common scenarios.
pub mod fixtures {
    use super::*;

    /// A `bash` tool call with a well-formed argument payload.
    pub fn bash_call(id: &str, command: &str) -> ToolCallRequest {
        let arguments = serde_json::json!({ "command": command }).to_string();
        ToolCallRequest::new(id, "bash", arguments)
    }

    /// A tool call with an arbitrary raw argument payload.
    pub fn raw_call(id: &str, name: &str, arguments: &str) -> ToolCallRequest {
        ToolCallRequest::new(id, name, arguments)
    }

    /// Model asks for one command, then answers in plain text.
    pub fn single_command(command: &str, answer: &str) -> MockBackend {
        MockBackend::new()
            .then_tool_calls("", vec![bash_call("call_1", command)])
            .then_text(answer)
    }
}
