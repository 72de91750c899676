//! OpenAI API client implementation
//!
//! Implements the LlmClient trait for OpenAI-compatible Chat Completions
//! endpoints, blocking until the full reply is available.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, TokenUsage};
use crate::config::LlmConfig;

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound on a server-requested retry-after
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// OpenAI API client
pub struct OpenAIClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl OpenAIClient {
    /// Create a new client, reading the API key from the environment
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, base_url = %config.base_url, "from_config: called");
        let api_key = config.api_key().map_err(|e| LlmError::Config(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    /// Build the request body for the OpenAI API
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(%self.model, %request.max_tokens, "build_request_body: called");

        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        })];

        messages.extend(request.messages.iter().map(|msg| {
            serde_json::json!({
                "role": msg.role.as_str(),
                "content": msg.content,
            })
        }));

        let max_tokens = request.max_tokens.min(self.max_tokens);

        // o1/o3 and gpt-5 models take max_completion_tokens instead of max_tokens
        let uses_completion_tokens =
            self.model.starts_with("gpt-5") || self.model.starts_with("o1") || self.model.starts_with("o3");

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });

        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }

    /// Parse the OpenAI API response
    fn parse_response(&self, api_response: OpenAIResponse) -> Result<CompletionResponse, LlmError> {
        debug!(choice_count = api_response.choices.len(), "parse_response: called");
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!("parse_response: reply truncated at max tokens");
        }

        let usage = api_response
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content,
            usage,
        })
    }
}

/// Parse a retry-after header given in whole seconds
fn parse_retry_after(value: Option<&str>) -> Duration {
    let secs = value
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(INITIAL_BACKOFF_MS / 1000)
        .min(MAX_RETRY_AFTER_SECS);
    Duration::from_secs(secs)
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, message_count = request.messages.len(), "complete: called");
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(&request);

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = last_error
                    .as_ref()
                    .and_then(LlmError::retry_after)
                    .unwrap_or_else(|| Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1)));
                warn!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "complete: retrying after transient error"
                );
                tokio::time::sleep(backoff).await;
            }

            let response = match self
                .http
                .post(url.clone())
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "complete: network error");
                    last_error = Some(LlmError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();

            if !response.status().is_success() {
                let err = if status == 429 {
                    let retry_after =
                        parse_retry_after(response.headers().get("retry-after").and_then(|v| v.to_str().ok()));
                    LlmError::RateLimited { retry_after }
                } else {
                    let text = response.text().await.unwrap_or_default();
                    LlmError::ApiError { status, message: text }
                };

                if !err.is_retryable() {
                    debug!(%status, "complete: API error");
                    return Err(err);
                }
                debug!(attempt, status, error = %err, "complete: retryable error");
                last_error = Some(err);
                continue;
            }

            debug!("complete: success");
            let api_response: OpenAIResponse = response.json().await?;
            return self.parse_response(api_response);
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

// OpenAI API response types

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
