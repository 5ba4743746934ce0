//! Interactive session: reads user turns and hands them to the agent.

use std::io::{self, Write};
use std::time::Instant;

use ma_protocol::ExecutionResult;

use crate::agent::{Agent, TurnOutcome};
use crate::operator::{Operator, ReadOutcome};
use crate::skills;

/// One line typed at the user prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input<'a> {
    Empty,
    Exit,
    Help,
    /// `/skill` lists skills, `/skill <name>` loads one.
    Skill(Option<&'a str>),
    UnknownCommand(&'a str),
    /// `!<command>`: run directly, no approval.
    Shell(&'a str),
    Message(&'a str),
}

pub fn classify(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if let Some(rest) = line.strip_prefix('!') {
        let command = rest.trim();
        return if command.is_empty() {
            Input::Empty
        } else {
            Input::Shell(command)
        };
    }
    if let Some(rest) = line.strip_prefix('/') {
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        return match name {
            "" => Input::Empty,
            "exit" | "quit" => Input::Exit,
            "help" => Input::Help,
            "skill" => Input::Skill((!args.is_empty()).then_some(args)),
            other => Input::UnknownCommand(other),
        };
    }
    Input::Message(line)
}

/// Transcript block describing a command the operator ran themselves.
pub fn format_command_result(result: &ExecutionResult) -> String {
    let mut content = format!("[command] {}", result.command);
    if !result.stdout.trim().is_empty() {
        content.push_str("\n[stdout]\n");
        content.push_str(result.stdout.trim_end_matches('\n'));
    }
    if !result.stderr.trim().is_empty() {
        content.push_str("\n[stderr]\n");
        content.push_str(result.stderr.trim_end_matches('\n'));
    }
    if !result.success() {
        content.push_str(&format!("\n[exit_code] {}", result.exit_code));
    }
    content
}

/// Output of `!` commands waiting to be sent with the next message.
#[derive(Debug, Default)]
pub struct PendingShellOutput {
    blocks: Vec<String>,
}

impl PendingShellOutput {
    pub fn push(&mut self, result: &ExecutionResult) {
        self.blocks.push(format_command_result(result));
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Prefix `message` with everything buffered and clear the buffer.
    pub fn attach(&mut self, message: &str) -> String {
        if self.blocks.is_empty() {
            return message.to_string();
        }
        let mut content = self.blocks.join("\n\n");
        content.push_str("\n\n");
        content.push_str(message);
        self.blocks.clear();
        content
    }
}

/// Run the session until `/exit`, `/quit`, Ctrl+C or end of input.
pub async fn run_repl<O: Operator, W: Write>(agent: &mut Agent<O, W>) -> io::Result<()> {
    let mut pending = PendingShellOutput::default();

    loop {
        let total = agent.session_usage().total_tokens;
        agent.renderer_mut().emit_session(total);

        let prompt = agent.renderer().prompt();
        let line = match agent.operator_mut().read_line(&prompt).await? {
            ReadOutcome::Line(line) => line,
            ReadOutcome::Interrupted | ReadOutcome::Eof => {
                tracing::debug!("input closed, ending session");
                return Ok(());
            }
        };

        match classify(&line) {
            Input::Empty => {}
            Input::Exit => return Ok(()),
            Input::Help => agent.renderer_mut().emit_help(),
            Input::UnknownCommand(name) => agent.renderer_mut().emit_unknown_command(name),
            Input::Shell(command) => {
                let started = Instant::now();
                let result = agent.executor().run(command).await;
                let duration_ms = started.elapsed().as_millis() as u64;
                agent
                    .audit_mut()
                    .log_executed("operator", command, result.exit_code, duration_ms);
                agent.renderer_mut().emit_command_output(&result);
                pending.push(&result);
            }
            Input::Skill(None) => {
                let names = skills::list(agent.skills_dir());
                let dir = agent.skills_dir().to_path_buf();
                agent.renderer_mut().emit_skill_list(&names, &dir);
            }
            Input::Skill(Some(name)) => {
                let Some(content) = skills::load(agent.skills_dir(), name) else {
                    let names = skills::list(agent.skills_dir());
                    let dir = agent.skills_dir().to_path_buf();
                    let renderer = agent.renderer_mut();
                    renderer.emit_error(&format!("Skill not found: {name}"), None);
                    renderer.emit_skill_list(&names, &dir);
                    continue;
                };
                agent
                    .renderer_mut()
                    .emit_skill_loaded(name, &skills::preview(&content));

                let prompt = agent.renderer().skill_input_prompt();
                let extra = match agent.operator_mut().read_line(&prompt).await? {
                    ReadOutcome::Line(extra) => extra,
                    ReadOutcome::Eof => String::new(),
                    ReadOutcome::Interrupted => {
                        agent.renderer_mut().emit_tool_notice("Skill cancelled.");
                        continue;
                    }
                };
                let content = pending.attach(&skills::compose(&content, &extra));
                if !send(agent, &content).await {
                    return Ok(());
                }
            }
            Input::Message(text) => {
                let content = pending.attach(text);
                if !send(agent, &content).await {
                    return Ok(());
                }
            }
        }
    }
}

/// Run one turn. Returns false once input has closed.
async fn send<O: Operator, W: Write>(agent: &mut Agent<O, W>, content: &str) -> bool {
    match agent.run_turn(content).await {
        TurnOutcome::Completed { .. } => true,
        TurnOutcome::Abandoned { error, .. } => {
            tracing::debug!(%error, "turn abandoned");
            true
        }
        TurnOutcome::InputClosed { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Schema, Settings};
    use crate::operator::ScriptedOperator;
    use crate::renderer::Renderer;
    use crate::style::Style;
    use ma_backend::MockBackend;
    use ma_protocol::Role;
    use std::path::Path;
    use std::sync::Arc;

    fn result(command: &str, exit_code: i32, stdout: &str, stderr: &str) -> ExecutionResult {
        ExecutionResult {
            command: command.to_string(),
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn settings(root: &Path) -> Settings {
        Settings {
            provider: "mock".to_string(),
            schema: Schema::OpenAi,
            base_url: "http://localhost".to_string(),
            api_key: "test".to_string(),
            model: "mock-model".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            workspace_root: root.to_path_buf(),
            system_prompt: "system".to_string(),
            skills_dir: root.join(".skills"),
            audit_path: None,
        }
    }

    fn agent(
        backend: Arc<MockBackend>,
        root: &Path,
        inputs: &[&str],
    ) -> Agent<ScriptedOperator, Vec<u8>> {
        Agent::new(
            backend,
            &settings(root),
            ScriptedOperator::new(inputs.iter().copied()),
            Renderer::new(Vec::new(), Style::disabled()),
        )
    }

    #[test]
    fn classify_lines() {
        assert_eq!(classify(""), Input::Empty);
        assert_eq!(classify("   "), Input::Empty);
        assert_eq!(classify("/exit"), Input::Exit);
        assert_eq!(classify("/quit"), Input::Exit);
        assert_eq!(classify(" /quit now "), Input::Exit);
        assert_eq!(classify("/help"), Input::Help);
        assert_eq!(classify("/"), Input::Empty);
        assert_eq!(classify("/clear"), Input::UnknownCommand("clear"));
        assert_eq!(classify("/skill"), Input::Skill(None));
        assert_eq!(classify("/skill   "), Input::Skill(None));
        assert_eq!(classify("/skill review pr"), Input::Skill(Some("review pr")));
        assert_eq!(classify("!"), Input::Empty);
        assert_eq!(classify("! ls -la "), Input::Shell("ls -la"));
        assert_eq!(classify("  list files "), Input::Message("list files"));
    }

    #[test]
    fn format_successful_result() {
        let block = format_command_result(&result("ls", 0, "a.txt\nb.txt\n", ""));
        assert_eq!(block, "[command] ls\n[stdout]\na.txt\nb.txt");
    }

    #[test]
    fn format_failed_result() {
        let block = format_command_result(&result("cat x", 1, "", "cat: x: No such file\n"));
        assert_eq!(
            block,
            "[command] cat x\n[stderr]\ncat: x: No such file\n[exit_code] 1"
        );
    }

    #[test]
    fn pending_output_is_attached_once() {
        let mut pending = PendingShellOutput::default();
        assert_eq!(pending.attach("hi"), "hi");

        pending.push(&result("pwd", 0, "/tmp\n", ""));
        pending.push(&result("true", 0, "", ""));
        assert!(!pending.is_empty());

        let content = pending.attach("what now?");
        assert_eq!(
            content,
            "[command] pwd\n[stdout]\n/tmp\n\n[command] true\n\nwhat now?"
        );
        assert!(pending.is_empty());
        assert_eq!(pending.attach("again"), "again");
    }

    #[tokio::test]
    async fn exit_stops_before_remaining_input() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let mut agent = agent(backend.clone(), dir.path(), &["", "/exit", "never sent"]);

        run_repl(&mut agent).await.unwrap();

        assert!(backend.requests().is_empty());
        assert_eq!(agent.operator_mut().remaining(), 1);
        assert_eq!(agent.conversation().len(), 1);
    }

    #[tokio::test]
    async fn interrupt_at_prompt_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let mut agent = agent(backend.clone(), dir.path(), &[]);
        agent.operator_mut().push(ReadOutcome::Interrupted);
        agent.operator_mut().push(ReadOutcome::Line("hello".to_string()));

        run_repl(&mut agent).await.unwrap();

        assert!(backend.requests().is_empty());
        assert_eq!(agent.operator_mut().remaining(), 1);
    }

    #[tokio::test]
    async fn shell_escape_output_prefixes_next_message() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new().then_text("It printed hi."));
        let mut agent = agent(backend.clone(), dir.path(), &["!echo hi", "what was that?"]);

        run_repl(&mut agent).await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        let user = &requests[0].messages[1];
        assert_eq!(user.role, Role::User);
        assert_eq!(
            user.content,
            "[command] echo hi\n[stdout]\nhi\n\nwhat was that?"
        );
        let out = String::from_utf8_lossy(&agent.renderer().writer).to_string();
        assert!(out.contains("hi\n"));
    }

    #[tokio::test]
    async fn slash_commands_do_not_reach_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let mut agent = agent(backend.clone(), dir.path(), &["/help", "/bogus", "/quit"]);

        run_repl(&mut agent).await.unwrap();

        assert!(backend.requests().is_empty());
        let out = String::from_utf8_lossy(&agent.renderer().writer).to_string();
        assert!(out.contains("Commands:"));
        assert!(out.contains("Unknown command: /bogus"));
    }

    fn write_skill(root: &Path, name: &str, content: &str) {
        let dir = root.join(".skills");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{name}.md")), content).unwrap();
    }

    #[tokio::test]
    async fn skill_list_does_not_reach_the_model() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "review", "Review the diff.");
        let backend = Arc::new(MockBackend::new());
        let mut agent = agent(backend.clone(), dir.path(), &["/skill", "/skill nope"]);

        run_repl(&mut agent).await.unwrap();

        assert!(backend.requests().is_empty());
        let out = String::from_utf8_lossy(&agent.renderer().writer).to_string();
        assert!(out.contains("  1. review"));
        assert!(out.contains("Skill not found: nope"));
    }

    #[tokio::test]
    async fn loaded_skill_is_sent_with_extra_input_and_shell_output() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "review", "Review the diff.\n");
        let backend = Arc::new(MockBackend::new().then_text("Looks fine."));
        let mut agent = agent(
            backend.clone(),
            dir.path(),
            &["!echo changed", "/skill review", "focus on errors"],
        );

        run_repl(&mut agent).await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].messages[1].content,
            "[command] echo changed\n[stdout]\nchanged\n\nReview the diff.\n\nfocus on errors"
        );
        let prompts = agent.operator_mut().prompts().to_vec();
        assert_eq!(prompts[2], "Additional input (optional): ");
        let out = String::from_utf8_lossy(&agent.renderer().writer).to_string();
        assert!(out.contains("✓ Loaded: review"));
    }

    #[tokio::test]
    async fn interrupted_skill_input_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "review", "Review the diff.");
        let backend = Arc::new(MockBackend::new());
        let mut agent = agent(backend.clone(), dir.path(), &["/skill review"]);
        agent.operator_mut().push(ReadOutcome::Interrupted);

        run_repl(&mut agent).await.unwrap();

        assert!(backend.requests().is_empty());
        assert_eq!(agent.conversation().len(), 1);
    }

    #[tokio::test]
    async fn input_closed_at_approval_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(
            MockBackend::new()
                .then_tool_calls("", vec![ma_backend::mock::fixtures::bash_call("c1", "ls")])
                .then_text("never requested"),
        );
        let mut agent = agent(backend.clone(), dir.path(), &["list files"]);

        run_repl(&mut agent).await.unwrap();

        assert_eq!(backend.requests().len(), 1);
        // User prompt, then the approval prompt that hit end of input
        assert_eq!(agent.operator_mut().prompts().len(), 2);
        assert_eq!(agent.conversation().check_protocol(), Ok(()));
    }

    #[tokio::test]
    async fn session_continues_after_failed_turn() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(
            MockBackend::new()
                .then_error(500, "upstream down")
                .then_text("Back now."),
        );
        let mut agent = agent(backend.clone(), dir.path(), &["first", "second"]);

        run_repl(&mut agent).await.unwrap();

        assert_eq!(backend.requests().len(), 2);
        let last = agent.conversation().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "Back now.");
    }
}
