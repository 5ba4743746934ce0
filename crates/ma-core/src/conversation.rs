//! Append-only transcript replayed verbatim on every completion request.

use std::collections::HashSet;

use ma_protocol::{Message, Role};
use thiserror::Error;

/// A break in the tool-call pairing between assistant and tool messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("tool message at index {index} answers unknown call id '{id}'")]
    UnexpectedToolMessage { index: usize, id: String },
    #[error("call id '{id}' answered more than once")]
    DuplicateAnswer { id: String },
    #[error("call ids left unanswered: {}", ids.join(", "))]
    Unanswered { ids: Vec<String> },
}

/// Ordered message history, seeded with one system message.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The full transcript, in order.
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Verify that every assistant tool call is answered exactly once by the
    /// tool messages that immediately follow it.
    pub fn check_protocol(&self) -> Result<(), ProtocolViolation> {
        let mut pending: HashSet<&str> = HashSet::new();
        let mut answered: HashSet<&str> = HashSet::new();

        for (index, message) in self.messages.iter().enumerate() {
            match message.role {
                Role::Tool => {
                    let id = message.tool_call_id.as_deref().unwrap_or_default();
                    if answered.contains(id) {
                        return Err(ProtocolViolation::DuplicateAnswer { id: id.to_string() });
                    }
                    if !pending.remove(id) {
                        return Err(ProtocolViolation::UnexpectedToolMessage {
                            index,
                            id: id.to_string(),
                        });
                    }
                    answered.insert(id);
                }
                _ => {
                    if !pending.is_empty() {
                        return Err(unanswered(&pending));
                    }
                    answered.clear();
                    if message.role == Role::Assistant {
                        pending = message.tool_calls.iter().map(|c| c.id.as_str()).collect();
                    }
                }
            }
        }

        if pending.is_empty() {
            Ok(())
        } else {
            Err(unanswered(&pending))
        }
    }
}

fn unanswered(pending: &HashSet<&str>) -> ProtocolViolation {
    let mut ids: Vec<String> = pending.iter().map(|id| id.to_string()).collect();
    ids.sort();
    ProtocolViolation::Unanswered { ids }
}
