//! LLM client module for ChatRelay
//!
//! The model is an external collaborator: chat turns and plan generation call
//! it with a snapshot of the session, never from inside a session actor.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod openai;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, TokenUsage};

use crate::config::LlmConfig;

/// Create an LLM client for the configured provider
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIClient::from_config(config)?)),
        other => Err(LlmError::Config(format!(
            "Unknown LLM provider: '{}'. Supported: openai",
            other
        ))),
    }
}
