//! Tool declarations and execution results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Static declaration of a tool sent along with every completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the argument object.
    pub parameters: Value,
}

/// Outcome of one approved shell command.
///
/// Serialized verbatim into the answering tool message so the model can parse
/// it deterministically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Pretty JSON payload for the tool message content.
    pub fn to_payload(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| {
            format!(
                "{{\"command\":{:?},\"exitCode\":{}}}",
                self.command, self.exit_code
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_camel_case_exit_code() {
        let result = ExecutionResult {
            command: "ls".to_string(),
            exit_code: 0,
            stdout: "a.txt\nb.txt\n".to_string(),
            stderr: String::new(),
        };
        let value: Value = serde_json::from_str(&result.to_payload()).unwrap();
        assert_eq!(value["command"], "ls");
        assert_eq!(value["exitCode"], 0);
        assert_eq!(value["stdout"], "a.txt\nb.txt\n");
        assert_eq!(value["stderr"], "");
        assert!(value.get("exit_code").is_none());
    }

    #[test]
    fn non_zero_exit_is_not_success() {
        let result = ExecutionResult {
            command: "false".to_string(),
            exit_code: 1,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(!result.success());
    }

    #[test]
    fn schema_serializes_parameters_inline() {
        let schema = ToolSchema {
            name: "bash".to_string(),
            description: "run".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        };
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["parameters"]["type"], "object");
    }
}
