//! The agent loop: one user turn at a time.
//!
//! A turn alternates between requesting a completion and dispatching the
//! tool calls it carries, until the model answers without tool calls. A
//! failed completion abandons the turn and leaves the transcript as it was
//! before the request.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use ma_backend::{BackendError, ChatBackend, ChatRequest};
use ma_protocol::{Message, ToolCallRequest, Usage};

use crate::approval::{self, Verdict};
use crate::audit::AuditLogger;
use crate::config::Settings;
use crate::conversation::Conversation;
use crate::executor::ShellExecutor;
use crate::operator::Operator;
use crate::renderer::Renderer;
use crate::tools::{self, ParsedCall};

pub const NO_COMMAND: &str = "No command provided.";
pub const REJECTED: &str = "User rejected command.";

#[derive(Debug)]
enum TurnState {
    RequestingCompletion,
    DispatchingToolCalls(Vec<ToolCallRequest>),
    Done,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered without tool calls after `rounds` completions.
    Completed { rounds: usize },
    /// A completion request failed; nothing was appended for it.
    Abandoned { rounds: usize, error: String },
    /// Input closed at an approval prompt. Every call of the last round
    /// was answered but no further completion was requested.
    InputClosed { rounds: usize },
}

pub struct Agent<O: Operator, W: Write> {
    backend: Arc<dyn ChatBackend>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    conversation: Conversation,
    executor: ShellExecutor,
    skills_dir: PathBuf,
    operator: O,
    renderer: Renderer<W>,
    audit: AuditLogger,
    session_usage: Usage,
    input_closed: bool,
}

impl<O: Operator, W: Write> Agent<O, W> {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        settings: &Settings,
        operator: O,
        renderer: Renderer<W>,
    ) -> Self {
        Self {
            backend,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            conversation: Conversation::new(&settings.system_prompt),
            executor: ShellExecutor::new(settings.workspace_root.clone()),
            skills_dir: settings.skills_dir.clone(),
            operator,
            renderer,
            audit: AuditLogger::noop(),
            session_usage: Usage::default(),
            input_closed: false,
        }
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn session_usage(&self) -> &Usage {
        &self.session_usage
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn executor(&self) -> &ShellExecutor {
        &self.executor
    }

    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }

    pub fn operator_mut(&mut self) -> &mut O {
        &mut self.operator
    }

    pub fn renderer(&self) -> &Renderer<W> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer<W> {
        &mut self.renderer
    }

    pub fn audit_mut(&mut self) -> &mut AuditLogger {
        &mut self.audit
    }

    /// Append `input` as a user message and run until the model stops
    /// requesting tools or a completion fails.
    pub async fn run_turn(&mut self, input: &str) -> TurnOutcome {
        self.conversation.append(Message::user(input));
        self.input_closed = false;

        let mut rounds = 0;
        let mut state = TurnState::RequestingCompletion;
        loop {
            state = match state {
                TurnState::RequestingCompletion => {
                    rounds += 1;
                    self.renderer.emit_round(rounds);
                    match self.request_completion().await {
                        Ok(message) => {
                            self.renderer.emit_assistant_text(&message.content);
                            let calls = message.tool_calls.clone();
                            self.conversation.append(message);
                            if calls.is_empty() {
                                TurnState::Done
                            } else {
                                TurnState::DispatchingToolCalls(calls)
                            }
                        }
                        Err(e) => {
                            self.report_transport_error(&e);
                            return TurnOutcome::Abandoned {
                                rounds,
                                error: e.to_string(),
                            };
                        }
                    }
                }
                TurnState::DispatchingToolCalls(calls) => {
                    for call in &calls {
                        let content = self.dispatch(call).await;
                        self.conversation.append(Message::tool(&call.id, content));
                    }
                    if let Err(violation) = self.conversation.check_protocol() {
                        tracing::error!(%violation, "transcript protocol violation");
                    }
                    if self.input_closed {
                        tracing::debug!("input closed during approval, ending turn");
                        return TurnOutcome::InputClosed { rounds };
                    }
                    TurnState::RequestingCompletion
                }
                TurnState::Done => return TurnOutcome::Completed { rounds },
            };
        }
    }

    async fn request_completion(&mut self) -> Result<Message, BackendError> {
        let request = ChatRequest::new(&self.model, self.conversation.snapshot().to_vec())
            .with_tools(tools::schemas())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        tracing::debug!(
            backend = self.backend.name(),
            messages = request.messages.len(),
            "requesting completion"
        );

        let response = self.backend.complete(&request).await?;

        if let Some(usage) = response.usage {
            self.session_usage.accumulate(&usage);
            self.renderer
                .emit_usage(&usage, self.session_usage.total_tokens);
        }
        tracing::debug!(
            tool_calls = response.message.tool_calls.len(),
            text_len = response.message.content.len(),
            "completion received"
        );
        Ok(response.message)
    }

    /// Answer one tool call. Returns the content of its tool message.
    async fn dispatch(&mut self, call: &ToolCallRequest) -> String {
        match tools::parse(call) {
            ParsedCall::UnknownTool(name) => {
                tracing::debug!(id = %call.id, %name, "unknown tool");
                let content = format!("Unknown tool: {name}");
                self.renderer.emit_tool_notice(&content);
                content
            }
            ParsedCall::EmptyCommand => {
                self.renderer.emit_tool_notice(NO_COMMAND);
                NO_COMMAND.to_string()
            }
            ParsedCall::ValidCommand { tool, command } => {
                self.audit.log_proposed(&call.id, &command);

                // Nobody is left to ask once input has closed
                let verdict = if self.input_closed {
                    Verdict::Closed
                } else {
                    approval::review(&mut self.operator, &mut self.renderer, &command).await
                };
                if verdict == Verdict::Closed {
                    self.input_closed = true;
                }
                if !verdict.is_approved() {
                    tracing::debug!(id = %call.id, ?verdict, "command rejected");
                    self.audit.log_rejected(&call.id, verdict.method());
                    return REJECTED.to_string();
                }
                self.audit.log_approved(&call.id, verdict.method());

                let started = Instant::now();
                let result = tool.execute(&self.executor, &command).await;
                let duration_ms = started.elapsed().as_millis() as u64;
                self.audit
                    .log_executed("model", &command, result.exit_code, duration_ms);
                self.renderer.emit_command_output(&result);
                result.to_payload()
            }
        }
    }

    fn report_transport_error(&mut self, error: &BackendError) {
        tracing::warn!(backend = self.backend.name(), %error, "completion failed");
        self.audit
            .log_transport_error(self.backend.name(), &error.to_string());
        self.renderer
            .emit_error(&error.to_string(), error.operator_hint());
    }
}
