//! Line-oriented console input.
//!
//! Both the user prompt and the approval prompt read through [`Operator`], so
//! the loop can be driven by a script in tests.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Result of one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A line, without its trailing newline.
    Line(String),
    /// Ctrl+C was pressed while waiting.
    Interrupted,
    /// Input is closed.
    Eof,
}

#[async_trait]
pub trait Operator: Send {
    async fn read_line(&mut self, prompt: &str) -> io::Result<ReadOutcome>;
}

/// Reads stdin on a dedicated thread and races each line against Ctrl+C.
pub struct TerminalOperator {
    lines: mpsc::UnboundedReceiver<io::Result<String>>,
}

impl TerminalOperator {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let stdin = io::stdin();
            let mut handle = stdin.lock();
            loop {
                let mut line = String::new();
                match handle.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });
        Self { lines: rx }
    }
}

impl Default for TerminalOperator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operator for TerminalOperator {
    async fn read_line(&mut self, prompt: &str) -> io::Result<ReadOutcome> {
        let mut stdout = io::stdout();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;

        tokio::select! {
            line = self.lines.recv() => match line {
                Some(Ok(line)) => Ok(ReadOutcome::Line(strip_newline(line))),
                Some(Err(e)) => Err(e),
                None => Ok(ReadOutcome::Eof),
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                println!();
                Ok(ReadOutcome::Interrupted)
            }
        }
    }
}

fn strip_newline(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

/// Replays canned input and records every prompt it was shown.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    inputs: VecDeque<ReadOutcome>,
    prompts: Vec<String>,
}

impl ScriptedOperator {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: lines
                .into_iter()
                .map(|l| ReadOutcome::Line(l.into()))
                .collect(),
            prompts: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: ReadOutcome) -> &mut Self {
        self.inputs.push_back(outcome);
        self
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn remaining(&self) -> usize {
        self.inputs.len()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn read_line(&mut self, prompt: &str) -> io::Result<ReadOutcome> {
        self.prompts.push(prompt.to_string());
        Ok(self.inputs.pop_front().unwrap_or(ReadOutcome::Eof))
    }
}
