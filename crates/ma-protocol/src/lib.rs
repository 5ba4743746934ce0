//! ma-protocol: Shared types for minagent.
//!
//! This crate defines the transcript, tool and streaming types used between
//! the agent loop and the model backends.

pub mod message;
pub mod stream;
pub mod tool;

pub use message::{Message, Role, ToolCallRequest};
pub use stream::{StreamEvent, Usage};
pub use tool::{ExecutionResult, ToolSchema};
