//! ChatService - one chat turn or plan request, end to end
//!
//! The model call happens between two actor operations and is never made
//! while an actor is busy, so a slow model never blocks the session's other
//! readers and writers.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::domain::{Message, Plan};
use crate::extract::{PlanExtractor, preview};
use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::router::SessionRouter;
use crate::session::SessionError;

/// Errors surfaced by the chat flow
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("model error: {0}")]
    Model(#[from] LlmError),
}

/// Shown to users instead of model error details
pub const MODEL_UNAVAILABLE: &str = "The model is temporarily unavailable, please try again.";

impl ChatError {
    /// Text safe to show an end user; storage and model details stay in the log
    pub fn user_message(&self) -> String {
        match self {
            ChatError::EmptyMessage => self.to_string(),
            ChatError::Session(e) => e.user_message(),
            ChatError::Model(_) => MODEL_UNAVAILABLE.to_string(),
        }
    }
}

/// A chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default)]
    pub debug: bool,
}

/// Timings for one chat turn, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugMetrics {
    pub total_ms: u64,
    pub do_read_ms: u64,
    pub ai_ms: u64,
    pub do_write_ms: u64,
    pub history_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugMetrics>,
}

/// Result of asking the model for a plan
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// The plan was extracted and stored
    Created(Plan),
    /// Extraction failed; `reply` explains why and was appended to the log
    Rejected { reply: String },
}

pub struct ChatService {
    router: SessionRouter,
    llm: Arc<dyn LlmClient>,
    extractor: PlanExtractor,
    config: ChatConfig,
    max_tokens: u32,
}

impl ChatService {
    pub fn new(router: SessionRouter, llm: Arc<dyn LlmClient>, config: ChatConfig, max_tokens: u32) -> Self {
        debug!(max_tokens, "ChatService::new: called");
        Self {
            router,
            llm,
            extractor: PlanExtractor::new(config.max_raw_preview),
            config,
            max_tokens,
        }
    }

    pub fn router(&self) -> &SessionRouter {
        &self.router
    }

    /// Relay one user message to the model and record both sides
    ///
    /// A model failure leaves the user message in the log.
    pub async fn send(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        debug!(session = %request.session_id, debug = request.debug, "send: called");
        if request.message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let started = Instant::now();
        let key = request.session_id.as_str();

        let write_started = Instant::now();
        self.router.append_message(key, Message::user(request.message)).await?;
        let mut write_ms = elapsed_ms(write_started);

        let read_started = Instant::now();
        let history = self.router.history(key).await?;
        let read_ms = elapsed_ms(read_started);
        let history_count = history.len();

        let ai_started = Instant::now();
        let reply = self.complete(&self.config.system_prompt, history).await?;
        let ai_ms = elapsed_ms(ai_started);

        let write_started = Instant::now();
        self.router.append_message(key, Message::assistant(reply.clone())).await?;
        write_ms += elapsed_ms(write_started);

        let debug = request.debug.then(|| DebugMetrics {
            total_ms: elapsed_ms(started),
            do_read_ms: read_ms,
            ai_ms,
            do_write_ms: write_ms,
            history_count,
        });
        if let Some(metrics) = &debug {
            debug!(session = %key, ?metrics, "send: metrics");
        }

        Ok(ChatResponse { reply, debug })
    }

    /// Ask the model for a checklist toward `goal` and store it as the session plan
    ///
    /// Unparseable output is reported back in the conversation; the previous
    /// plan stays in place.
    pub async fn generate_plan(&self, session_id: &str, goal: &str) -> Result<PlanOutcome, ChatError> {
        debug!(session = %session_id, "generate_plan: called");
        if goal.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let history = self.router.append_message(session_id, Message::user(goal)).await?;
        let raw = self.complete(&self.config.plan_prompt, history).await?;

        match self.extractor.extract(&raw) {
            Ok(plan) => {
                let plan = self.router.set_plan(session_id, plan).await?;
                info!(session = %session_id, title = %plan.title, steps = plan.steps.len(), "Plan created");
                let confirmation = format!("Created plan \"{}\" with {} steps.", plan.title, plan.steps.len());
                self.router
                    .append_message(session_id, Message::assistant(confirmation))
                    .await?;
                Ok(PlanOutcome::Created(plan))
            }
            Err(e) => {
                warn!(session = %session_id, error = %e, "Plan extraction failed");
                let reply = format!(
                    "I couldn't turn that into a plan ({}). The model replied: {}",
                    e,
                    e.raw_preview()
                );
                self.router
                    .append_message(session_id, Message::assistant(reply.clone()))
                    .await?;
                Ok(PlanOutcome::Rejected { reply })
            }
        }
    }

    async fn complete(&self, system_prompt: &str, history: Vec<Message>) -> Result<String, ChatError> {
        let request = CompletionRequest {
            system_prompt: system_prompt.to_string(),
            messages: history,
            max_tokens: self.max_tokens,
        };
        let response = self.llm.complete(request).await?;
        debug!(usage = ?response.usage, "complete: model replied");

        match response.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            other => Err(ChatError::Model(LlmError::InvalidResponse(format!(
                "empty reply: {}",
                preview(other.as_deref().unwrap_or_default(), self.config.max_raw_preview)
            )))),
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::domain::{PlanStep, Role};
    use crate::llm::CompletionResponse;
    use crate::llm::client::mock::MockLlmClient;
    use sessionstore::MemoryStore;

    fn service(llm: MockLlmClient) -> (ChatService, Arc<MockLlmClient>) {
        let llm = Arc::new(llm);
        let cfg = SessionConfig {
            idle_timeout_ms: 0,
            ..SessionConfig::default()
        };
        let router = SessionRouter::new(Arc::new(MemoryStore::new()), &cfg);
        let service = ChatService::new(router, llm.clone(), ChatConfig::default(), 256);
        (service, llm)
    }

    fn request(message: &str, debug: bool) -> ChatRequest {
        ChatRequest {
            session_id: "s1".to_string(),
            message: message.to_string(),
            debug,
        }
    }

    #[tokio::test]
    async fn test_send_records_both_sides() {
        let (chat, llm) = service(MockLlmClient::replying(&["Hello back"]));

        let response = chat.send(request("Hello", false)).await.unwrap();
        assert_eq!(response.reply, "Hello back");
        assert!(response.debug.is_none());

        let history = chat.router().history("s1").await.unwrap();
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert!(history.iter().all(|m| m.timestamp.is_some()));

        let sent = llm.requests();
        assert_eq!(sent[0].system_prompt, ChatConfig::default().system_prompt);
        assert_eq!(sent[0].messages.len(), 1);
        assert_eq!(sent[0].messages[0].content, "Hello");
        assert_eq!(sent[0].max_tokens, 256);
    }

    #[tokio::test]
    async fn test_send_includes_prior_turns() {
        let (chat, llm) = service(MockLlmClient::replying(&["one", "two"]));

        chat.send(request("first", false)).await.unwrap();
        chat.send(request("second", false)).await.unwrap();

        let contents: Vec<String> = llm.requests()[1].messages.iter().map(|m| m.content.clone()).collect();
        assert_eq!(contents, vec!["first", "one", "second"]);
    }

    #[tokio::test]
    async fn test_send_debug_metrics() {
        let (chat, _) = service(MockLlmClient::replying(&["ok"]));

        let response = chat.send(request("hi", true)).await.unwrap();
        let metrics = response.debug.unwrap();
        assert_eq!(metrics.history_count, 1);
        assert!(metrics.total_ms >= metrics.ai_ms);
    }

    #[tokio::test]
    async fn test_model_failure_keeps_user_message() {
        let (chat, _) = service(MockLlmClient::new(vec![Err(LlmError::ApiError {
            status: 500,
            message: "boom".to_string(),
        })]));

        let err = chat.send(request("are you there?", false)).await.unwrap_err();
        assert!(matches!(err, ChatError::Model(_)));

        let history = chat.router().history("s1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_failures_map_to_try_again() {
        let store = Arc::new(MemoryStore::new());
        let router = SessionRouter::new(store.clone(), &SessionConfig::default());
        let chat = ChatService::new(
            router,
            Arc::new(MockLlmClient::new(vec![Err(LlmError::ApiError {
                status: 503,
                message: "upstream overloaded".to_string(),
            })])),
            ChatConfig::default(),
            256,
        );

        let err = chat.send(request("hi", false)).await.unwrap_err();
        assert_eq!(err.user_message(), MODEL_UNAVAILABLE);

        store.set_fail_writes(true);
        let err = chat.send(request("hi again", false)).await.unwrap_err();
        assert!(matches!(err, ChatError::Session(ref e) if e.is_storage()));
        assert_eq!(err.user_message(), crate::session::STORAGE_UNAVAILABLE);

        assert_eq!(ChatError::EmptyMessage.user_message(), "message is empty");
    }

    #[tokio::test]
    async fn test_empty_model_reply_is_an_error() {
        let (chat, _) = service(MockLlmClient::new(vec![Ok(CompletionResponse::default())]));

        let err = chat.send(request("hi", false)).await.unwrap_err();
        assert!(matches!(err, ChatError::Model(LlmError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_blank_message_rejected_without_writes() {
        let (chat, llm) = service(MockLlmClient::replying(&[]));

        assert!(matches!(chat.send(request("   ", false)).await, Err(ChatError::EmptyMessage)));
        assert!(chat.router().history("s1").await.unwrap().is_empty());
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_plan_from_wrapped_json() {
        let raw = r#"Here you go: {"title":"Trip","steps":[{"id":"1","text":"Book"},{"text":"Pack","done":true}]} Enjoy!"#;
        let (chat, llm) = service(MockLlmClient::replying(&[raw]));

        let outcome = chat.generate_plan("s1", "plan my trip").await.unwrap();
        let PlanOutcome::Created(plan) = outcome else {
            panic!("expected a plan");
        };
        assert_eq!(plan.title, "Trip");
        assert_eq!(plan.steps[1].id, "2");
        assert!(plan.steps.iter().all(|s| !s.done));

        assert_eq!(chat.router().plan("s1").await.unwrap(), Some(plan));
        assert_eq!(llm.requests()[0].system_prompt, ChatConfig::default().plan_prompt);

        let history = chat.router().history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[1].content.contains("Trip"));
    }

    #[tokio::test]
    async fn test_failed_plan_keeps_previous_plan() {
        let (chat, _) = service(MockLlmClient::replying(&["Sorry, I can't help with that."]));
        let existing = chat
            .router()
            .set_plan("s1", Plan::new("Old", vec![PlanStep::new("1", "keep me")]))
            .await
            .unwrap();

        let outcome = chat.generate_plan("s1", "new goal").await.unwrap();
        let PlanOutcome::Rejected { reply } = outcome else {
            panic!("expected rejection");
        };
        assert!(reply.contains("Sorry, I can't help with that."));

        assert_eq!(chat.router().plan("s1").await.unwrap(), Some(existing));
        let history = chat.router().history("s1").await.unwrap();
        assert_eq!(history.last().unwrap().content, reply);
    }

    #[tokio::test]
    async fn test_long_conversation_stays_bounded() {
        let replies: Vec<String> = (0..20).map(|i| format!("reply {i}")).collect();
        let refs: Vec<&str> = replies.iter().map(String::as_str).collect();
        let (chat, llm) = service(MockLlmClient::replying(&refs));

        for i in 0..20 {
            chat.send(request(&format!("msg {i}"), false)).await.unwrap();
        }

        let history = chat.router().history("s1").await.unwrap();
        assert_eq!(history.len(), 25);
        assert_eq!(history.last().unwrap().content, "reply 19");
        assert!(llm.requests().iter().all(|r| r.messages.len() <= 25));
    }
}
