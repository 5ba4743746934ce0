//! Tool registry and tool-call parsing.
//!
//! Tools form a closed set. The agent loop works with [`parse`] and
//! [`Tool`] rather than comparing tool names itself.

use ma_protocol::{ExecutionResult, ToolCallRequest, ToolSchema};
use serde_json::{json, Value};
use thiserror::Error;

use crate::executor::ShellExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Bash,
}

/// Why a tool call's arguments did not yield a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("arguments are not valid JSON: {0}")]
    Malformed(String),
    #[error("no command provided")]
    MissingCommand,
}

/// Outcome of parsing one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCall {
    ValidCommand { tool: Tool, command: String },
    EmptyCommand,
    UnknownTool(String),
}

impl Tool {
    pub const ALL: &'static [Tool] = &[Tool::Bash];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Bash => "bash",
        }
    }

    pub fn schema(&self) -> ToolSchema {
        match self {
            Tool::Bash => ToolSchema {
                name: self.name().to_string(),
                description: "Execute a shell command in the workspace.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "command": {
                            "type": "string",
                            "description": "Shell command to run."
                        }
                    },
                    "required": ["command"]
                }),
            },
        }
    }

    /// Extract the command from a raw argument payload.
    pub fn validate(&self, arguments: &str) -> Result<String, ArgumentError> {
        match self {
            Tool::Bash => {
                let payload: Value = serde_json::from_str(arguments)
                    .map_err(|e| ArgumentError::Malformed(e.to_string()))?;
                payload
                    .get("command")
                    .and_then(Value::as_str)
                    .filter(|c| !c.trim().is_empty())
                    .map(str::to_string)
                    .ok_or(ArgumentError::MissingCommand)
            }
        }
    }

    pub async fn execute(&self, executor: &ShellExecutor, command: &str) -> ExecutionResult {
        match self {
            Tool::Bash => executor.run(command).await,
        }
    }
}

/// Declarations for every tool, sent with each completion request.
pub fn schemas() -> Vec<ToolSchema> {
    Tool::ALL.iter().map(Tool::schema).collect()
}

pub fn parse(call: &ToolCallRequest) -> ParsedCall {
    let Some(tool) = Tool::from_name(&call.name) else {
        return ParsedCall::UnknownTool(call.name.clone());
    };
    match tool.validate(&call.arguments) {
        Ok(command) => ParsedCall::ValidCommand { tool, command },
        Err(e) => {
            tracing::debug!(id = %call.id, error = %e, "tool call has no usable command");
            ParsedCall::EmptyCommand
        }
    }
}
