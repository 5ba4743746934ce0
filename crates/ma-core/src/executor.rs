//! Runs approved commands and captures their output.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use ma_protocol::ExecutionResult;
use tokio::process::Command;

/// Exit code reported when the shell itself could not be started.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

const DEFAULT_SHELL: &str = "bash";

/// Executes one command per call as `bash -c <command>` in a fixed root.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    root: PathBuf,
    shell: String,
}

impl ShellExecutor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            shell: DEFAULT_SHELL.to_string(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `command` to completion. A non-zero exit is a normal result, and
    /// so is a shell that fails to start.
    pub async fn run(&self, command: &str) -> ExecutionResult {
        tracing::debug!(command, root = %self.root.display(), "executing");

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(out) => ExecutionResult {
                command: command.to_string(),
                exit_code: exit_code(out.status),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            },
            Err(e) => {
                tracing::warn!(error = %e, shell = %self.shell, "failed to spawn shell");
                ExecutionResult {
                    command: command.to_string(),
                    exit_code: SPAWN_FAILURE_EXIT_CODE,
                    stdout: String::new(),
                    stderr: format!("failed to start {}: {e}", self.shell),
                }
            }
        }
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
