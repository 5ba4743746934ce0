//! ma-core: Agent loop and interactive session for minagent.
//!
//! This crate contains configuration, the tool-call protocol, the approval
//! gate, the shell executor and the REPL. Exposed as a library for
//! integration testing.

pub mod agent;
pub mod approval;
pub mod audit;
pub mod config;
pub mod conversation;
pub mod executor;
pub mod logging;
pub mod operator;
pub mod renderer;
pub mod repl;
pub mod skills;
pub mod style;
pub mod tools;

use std::sync::Arc;

use ma_backend::{AnthropicClient, BackendError, ChatBackend, OpenAiClient};

use crate::config::{Schema, Settings};

/// Construct the backend that speaks `settings.schema`.
pub fn build_backend(settings: &Settings) -> Result<Arc<dyn ChatBackend>, BackendError> {
    let backend: Arc<dyn ChatBackend> = match settings.schema {
        Schema::OpenAi => Arc::new(OpenAiClient::new(
            settings.provider.as_str(),
            settings.api_key.as_str(),
            settings.base_url.as_str(),
        )?),
        Schema::Anthropic => Arc::new(AnthropicClient::with_base_url(
            settings.api_key.as_str(),
            settings.base_url.as_str(),
        )?),
    };
    Ok(backend)
}
