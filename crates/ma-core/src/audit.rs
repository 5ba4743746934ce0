//! Append-only JSONL audit logger for tool-call events.
//!
//! Writes one JSON object per line: proposed commands, approval decisions,
//! executions, and completion requests that failed.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Append-only JSONL audit logger.
pub struct AuditLogger {
    writer: Option<BufWriter<File>>,
    session_id: String,
}

impl AuditLogger {
    /// Create a new audit logger that writes to the given path.
    /// Creates parent directories if they don't exist.
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Some(BufWriter::new(file)),
            session_id: generate_session_id(),
        })
    }

    /// Create a no-op logger that discards all events.
    pub fn noop() -> Self {
        Self {
            writer: None,
            session_id: generate_session_id(),
        }
    }

    /// Open the log at `path`, or fall back to a no-op logger.
    pub fn open_or_noop(path: Option<&Path>) -> (Self, Option<io::Error>) {
        match path {
            Some(path) => match Self::new(path) {
                Ok(logger) => (logger, None),
                Err(e) => (Self::noop(), Some(e)),
            },
            None => (Self::noop(), None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Log a command proposed by the model.
    pub fn log_proposed(&mut self, call_id: &str, command: &str) {
        self.write_event(serde_json::json!({
            "ts": epoch_secs(),
            "session": self.session_id,
            "type": "proposed",
            "call_id": call_id,
            "command": command,
        }));
    }

    pub fn log_approved(&mut self, call_id: &str, method: &str) {
        self.write_event(serde_json::json!({
            "ts": epoch_secs(),
            "session": self.session_id,
            "type": "approved",
            "call_id": call_id,
            "method": method,
        }));
    }

    pub fn log_rejected(&mut self, call_id: &str, method: &str) {
        self.write_event(serde_json::json!({
            "ts": epoch_secs(),
            "session": self.session_id,
            "type": "rejected",
            "call_id": call_id,
            "method": method,
        }));
    }

    /// Log a command execution result. `source` is `"model"` or `"operator"`.
    pub fn log_executed(&mut self, source: &str, command: &str, exit_code: i32, duration_ms: u64) {
        self.write_event(serde_json::json!({
            "ts": epoch_secs(),
            "session": self.session_id,
            "type": "executed",
            "source": source,
            "command": command,
            "exit_code": exit_code,
            "duration_ms": duration_ms,
        }));
    }

    /// Log a completion request that failed and abandoned the turn.
    pub fn log_transport_error(&mut self, provider: &str, error: &str) {
        self.write_event(serde_json::json!({
            "ts": epoch_secs(),
            "session": self.session_id,
            "type": "transport_error",
            "provider": provider,
            "error": error,
        }));
    }

    fn write_event(&mut self, value: serde_json::Value) {
        if let Some(ref mut writer) = self.writer {
            if let Ok(line) = serde_json::to_string(&value) {
                let _ = writeln!(writer, "{line}");
                let _ = writer.flush();
            }
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn generate_session_id() -> String {
    let pid = std::process::id();
    let ts = epoch_secs();
    format!("s{:x}", pid ^ (ts as u32))
}
