//! Human approval before any proposed command runs.
//!
//! Only an empty line, `y` or `Y` approves. Everything else rejects,
//! including Ctrl+C, closed input and read errors.

use std::io::Write;

use crate::operator::{Operator, ReadOutcome};
use crate::renderer::Renderer;

const ESCAPE: char = '\x1b';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

/// How the operator answered an approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Rejected,
    /// Ctrl+C at the prompt.
    Cancelled,
    /// Input closed or unreadable.
    Closed,
}

impl Verdict {
    pub fn decision(self) -> Decision {
        match self {
            Verdict::Approved => Decision::Approve,
            Verdict::Rejected | Verdict::Cancelled | Verdict::Closed => Decision::Reject,
        }
    }

    pub fn is_approved(self) -> bool {
        self.decision() == Decision::Approve
    }

    /// Short label recorded in the audit log.
    pub fn method(self) -> &'static str {
        match self {
            Verdict::Approved | Verdict::Rejected => "keystroke",
            Verdict::Cancelled => "interrupt",
            Verdict::Closed => "eof",
        }
    }
}

/// Map one line of approval input to a decision.
pub fn decide(input: &str) -> Decision {
    if input.starts_with(ESCAPE) {
        return Decision::Reject;
    }
    match input.trim() {
        "" | "y" | "Y" => Decision::Approve,
        _ => Decision::Reject,
    }
}

/// Show `command` and wait for one answer.
pub async fn review<O, W>(operator: &mut O, renderer: &mut Renderer<W>, command: &str) -> Verdict
where
    O: Operator + ?Sized,
    W: Write,
{
    renderer.emit_approval_prompt(command);

    let verdict = match operator.read_line(&renderer.prompt()).await {
        Ok(ReadOutcome::Line(line)) => match decide(&line) {
            Decision::Approve => Verdict::Approved,
            Decision::Reject => Verdict::Rejected,
        },
        Ok(ReadOutcome::Interrupted) => Verdict::Cancelled,
        Ok(ReadOutcome::Eof) => Verdict::Closed,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read approval input");
            Verdict::Closed
        }
    };

    renderer.emit_verdict(verdict);
    verdict
}
