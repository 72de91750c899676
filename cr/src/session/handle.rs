//! SessionHandle - cloneable client for one session actor

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{SessionCommand, SessionError, SessionResponse};
use crate::domain::{Message, Plan};
use crate::instrument::{Operation, OperationHook};

/// Handle to send commands to a session actor
#[derive(Clone)]
pub struct SessionHandle {
    key: Arc<str>,
    tx: mpsc::Sender<SessionCommand>,
    hook: Option<Arc<dyn OperationHook>>,
}

impl SessionHandle {
    pub(crate) fn new(key: &str, tx: mpsc::Sender<SessionCommand>, hook: Option<Arc<dyn OperationHook>>) -> Self {
        Self {
            key: Arc::from(key),
            tx,
            hook,
        }
    }

    /// True once the actor has stopped accepting commands
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Append a message (stamped with `now` if it has no timestamp); returns the updated log
    pub async fn append_message(&self, message: Message) -> SessionResponse<Vec<Message>> {
        debug!(session = %self.key, role = %message.role, "append_message: called");
        self.request(Operation::AppendMessage, |reply| SessionCommand::AppendMessage { message, reply })
            .await
    }

    /// Current log, oldest first
    pub async fn history(&self) -> SessionResponse<Vec<Message>> {
        debug!(session = %self.key, "history: called");
        self.request(Operation::History, |reply| SessionCommand::History { reply })
            .await
    }

    /// Drop the log and the plan, durably
    pub async fn clear(&self) -> SessionResponse<()> {
        debug!(session = %self.key, "clear: called");
        self.request(Operation::Clear, |reply| SessionCommand::Clear { reply })
            .await
    }

    pub async fn plan(&self) -> SessionResponse<Option<Plan>> {
        debug!(session = %self.key, "plan: called");
        self.request(Operation::GetPlan, |reply| SessionCommand::GetPlan { reply })
            .await
    }

    /// Replace the plan wholesale; returns the normalized plan as persisted
    pub async fn set_plan(&self, plan: Plan) -> SessionResponse<Plan> {
        debug!(session = %self.key, title = %plan.title, "set_plan: called");
        self.request(Operation::SetPlan, |reply| SessionCommand::SetPlan { plan, reply })
            .await
    }

    /// Mark one step done/undone; unknown ids and a missing plan are no-ops
    pub async fn update_step(&self, step_id: &str, done: bool) -> SessionResponse<Option<Plan>> {
        debug!(session = %self.key, %step_id, %done, "update_step: called");
        let step_id = step_id.to_string();
        self.request(Operation::UpdateStep, |reply| SessionCommand::UpdateStep {
            step_id,
            done,
            reply,
        })
        .await
    }

    /// Ask the actor to stop after the commands already queued
    pub async fn shutdown(&self) -> SessionResponse<()> {
        debug!(session = %self.key, "shutdown: called");
        self.tx
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| SessionError::ActorUnavailable)
    }

    async fn request<T>(
        &self,
        operation: Operation,
        build: impl FnOnce(oneshot::Sender<SessionResponse<T>>) -> SessionCommand,
    ) -> SessionResponse<T> {
        let started = Instant::now();
        let (reply_tx, reply_rx) = oneshot::channel();

        let result = match self.tx.send(build(reply_tx)).await {
            Ok(()) => reply_rx.await.unwrap_or(Err(SessionError::ReplyDropped)),
            Err(_) => Err(SessionError::ActorUnavailable),
        };

        if let Some(hook) = &self.hook {
            hook.on_operation(&self.key, operation, started.elapsed(), result.is_ok());
        }
        result
    }
}
