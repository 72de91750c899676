//! LLM request/response types

use crate::domain::Message;

/// Everything needed for one model call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt sent ahead of the conversation
    pub system_prompt: String,

    /// Conversation so far, oldest first; system messages are passed through
    pub messages: Vec<Message>,

    /// Max tokens for the response (capped by config)
    pub max_tokens: u32,
}

/// Model output for one call
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    /// Reply text; None when the model produced no content
    pub content: Option<String>,

    pub usage: TokenUsage,
}

impl CompletionResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            usage: TokenUsage::default(),
        }
    }
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
