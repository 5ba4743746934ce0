//! Operator-facing console output.
//!
//! `Renderer<W: Write>` owns every line the operator sees apart from the
//! input echo. Tests render into a `Vec<u8>` with `Style::disabled()`.

use std::io::Write;
use std::path::Path;

use ma_protocol::{ExecutionResult, Usage};

use crate::approval::Verdict;
use crate::style::{format_tokens, visible_width, Color, Style};

const HELP_ENTRIES: &[(&str, &str)] = &[
    ("/skill [name]", "List skills, or send one as your next message"),
    ("/help", "Show this help"),
    ("/exit, /quit", "Leave the session"),
    ("!<command>", "Run a command yourself; output is sent with your next message"),
];

pub struct Renderer<W: Write> {
    pub writer: W,
    style: Style,
}

impl<W: Write> Renderer<W> {
    pub fn new(writer: W, style: Style) -> Self {
        Self { writer, style }
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// The input prompt, shared by user turns and approvals.
    pub fn prompt(&self) -> String {
        self.style.paint(Color::Cyan, "> ")
    }

    pub fn emit_banner(&mut self, model: &str, provider: &str, root: &Path) {
        let _ = writeln!(
            self.writer,
            "{}{}",
            self.style.bold("minagent"),
            self.style
                .paint(Color::Gray, &format!(" ({provider}: {model})"))
        );
        let _ = writeln!(
            self.writer,
            "{}",
            self.style
                .paint(Color::Gray, &format!("workspace: {}", root.display()))
        );
        let _ = writeln!(
            self.writer,
            "{}",
            self.style
                .paint(Color::Gray, "Type /help for commands, /exit to quit.")
        );
        let _ = writeln!(self.writer);
        let _ = self.writer.flush();
    }

    pub fn emit_help(&mut self) {
        let _ = writeln!(self.writer);
        let _ = writeln!(self.writer, "{}", self.style.bold("Commands:"));
        let width = HELP_ENTRIES
            .iter()
            .map(|(cmd, _)| visible_width(cmd))
            .max()
            .unwrap_or(0);
        for (cmd, desc) in HELP_ENTRIES {
            let pad = " ".repeat(width - visible_width(cmd) + 3);
            let _ = writeln!(
                self.writer,
                "  {}{pad}{}",
                self.style.paint(Color::Cyan, cmd),
                self.style.paint(Color::Gray, desc)
            );
        }
        let _ = writeln!(self.writer);
        let _ = self.writer.flush();
    }

    /// Separator before each completion request within a turn.
    pub fn emit_round(&mut self, round: usize) {
        let _ = writeln!(
            self.writer,
            "{}",
            self.style
                .paint(Color::Gray, &format!("─── turn {round} ───"))
        );
        let _ = self.writer.flush();
    }

    pub fn emit_assistant_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let _ = writeln!(self.writer, "{text}");
        let _ = self.writer.flush();
    }

    /// Show a proposed command with its choices.
    pub fn emit_approval_prompt(&mut self, command: &str) {
        let _ = writeln!(self.writer);
        let _ = writeln!(self.writer, "{}", self.style.paint(Color::Yellow, "Command:"));
        for line in command.lines() {
            let _ = writeln!(self.writer, "  {}", self.style.bold(line));
        }
        let _ = writeln!(self.writer);
        for choice in ["[enter/y] Run", "[n]       Reject", "[ctrl+c]  Cancel"] {
            let _ = writeln!(self.writer, "  {}", self.style.paint(Color::Gray, choice));
        }
        let _ = writeln!(self.writer);
        let _ = self.writer.flush();
    }

    pub fn emit_verdict(&mut self, verdict: Verdict) {
        let line = match verdict {
            Verdict::Approved => self.style.paint(Color::Green, "✓ Running..."),
            Verdict::Rejected | Verdict::Closed => self.style.paint(Color::Yellow, "✗ Rejected"),
            Verdict::Cancelled => self.style.paint(Color::Yellow, "✗ Cancelled"),
        };
        let _ = writeln!(self.writer, "{line}");
        let _ = self.writer.flush();
    }

    /// A tool call that was answered without running anything.
    pub fn emit_tool_notice(&mut self, text: &str) {
        let _ = writeln!(self.writer, "{}", self.style.paint(Color::Gray, text));
        let _ = self.writer.flush();
    }

    /// Echo captured output; stderr is red when the command failed.
    pub fn emit_command_output(&mut self, result: &ExecutionResult) {
        let stdout = result.stdout.trim_end_matches('\n');
        if !stdout.trim().is_empty() {
            let _ = writeln!(self.writer, "{stdout}");
        }
        let stderr = result.stderr.trim_end_matches('\n');
        if !stderr.trim().is_empty() {
            if result.success() {
                let _ = writeln!(self.writer, "{stderr}");
            } else {
                let _ = writeln!(self.writer, "{}", self.style.paint(Color::Red, stderr));
            }
        }
        if !result.success() {
            let _ = writeln!(
                self.writer,
                "{}",
                self.style
                    .paint(Color::Gray, &format!("[exit code {}]", result.exit_code))
            );
        }
        let _ = self.writer.flush();
    }

    pub fn emit_error(&mut self, msg: &str, hint: Option<&str>) {
        let _ = writeln!(
            self.writer,
            "{}",
            self.style.paint(Color::Red, &format!("error: {msg}"))
        );
        if let Some(hint) = hint {
            let _ = writeln!(
                self.writer,
                "{}",
                self.style.paint(Color::Gray, &format!("hint: {hint}"))
            );
        }
        let _ = self.writer.flush();
    }

    pub fn emit_warning(&mut self, msg: &str) {
        let _ = writeln!(
            self.writer,
            "{}",
            self.style.paint(Color::Yellow, &format!("warning: {msg}"))
        );
        let _ = self.writer.flush();
    }

    /// Token counts for one response: `[tokens] in:X out:Y | session:Z`
    pub fn emit_usage(&mut self, usage: &Usage, session_total: u32) {
        let _ = writeln!(
            self.writer,
            "{}",
            self.style.paint(
                Color::Gray,
                &format!(
                    "[tokens] in:{} out:{} | session:{}",
                    usage.prompt_tokens, usage.completion_tokens, session_total
                )
            )
        );
        let _ = self.writer.flush();
    }

    /// Running total shown before the user prompt once anything was spent.
    pub fn emit_session(&mut self, total: u32) {
        if total == 0 {
            return;
        }
        let _ = writeln!(
            self.writer,
            "{}",
            self.style
                .paint(Color::Gray, &format!("[session] {} tokens", format_tokens(total)))
        );
        let _ = self.writer.flush();
    }

    pub fn emit_skill_list(&mut self, skills: &[String], dir: &Path) {
        let _ = writeln!(self.writer);
        let _ = writeln!(self.writer, "{}", self.style.bold("Available skills:"));
        if skills.is_empty() {
            let _ = writeln!(self.writer, "{}", self.style.paint(Color::Gray, "  (none)"));
        }
        for (i, skill) in skills.iter().enumerate() {
            let _ = writeln!(
                self.writer,
                "{} {skill}",
                self.style.paint(Color::Cyan, &format!("  {}.", i + 1))
            );
        }
        let _ = writeln!(
            self.writer,
            "{}",
            self.style.paint(
                Color::Gray,
                &format!("\nUsage: /skill <name>  (reads {}/<name>.md)", dir.display())
            )
        );
        let _ = writeln!(self.writer);
        let _ = self.writer.flush();
    }

    /// Confirmation with a short preview of the loaded skill.
    pub fn emit_skill_loaded(&mut self, name: &str, preview: &str) {
        let rule = "─".repeat(40);
        let _ = writeln!(
            self.writer,
            "{}",
            self.style.paint(Color::Green, &format!("✓ Loaded: {name}"))
        );
        let _ = writeln!(self.writer, "{}", self.style.paint(Color::Gray, &rule));
        let _ = writeln!(self.writer, "{}", self.style.paint(Color::Gray, preview));
        let _ = writeln!(self.writer, "{}", self.style.paint(Color::Gray, &rule));
        let _ = self.writer.flush();
    }

    pub fn skill_input_prompt(&self) -> String {
        self.style
            .paint(Color::Gray, "Additional input (optional): ")
    }

    pub fn emit_unknown_command(&mut self, name: &str) {
        self.emit_error(&format!("Unknown command: /{name}"), None);
        self.emit_help();
    }
}
