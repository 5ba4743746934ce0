//! Streaming events and token usage.

use serde::{Deserialize, Serialize};

/// Events emitted by a streaming backend while a response is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A chunk of response text.
    TextDelta(String),

    /// A complete tool call; arguments arrive fully accumulated.
    ToolUse {
        id: String,
        name: String,
        input_json: String,
    },

    /// Token usage information. Streams may report input and output
    /// counts in separate events.
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },

    /// Stream has completed successfully.
    Done,

    /// An error reported inside the stream.
    Error(String),
}

/// Token usage of one completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Add another usage record into this one.
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}
