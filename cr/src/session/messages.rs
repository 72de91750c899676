//! Session actor messages
//!
//! Commands and responses for the per-session actor.

use sessionstore::StoreError;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{Message, Plan};
use crate::instrument::Operation;

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("Corrupt session data under '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The command was never delivered; safe to retry against a new actor
    #[error("Session actor unavailable")]
    ActorUnavailable,

    /// The actor stopped after accepting the command; outcome unknown
    #[error("Session actor dropped the reply")]
    ReplyDropped,
}

/// Shown to users instead of storage error details
pub const STORAGE_UNAVAILABLE: &str = "Session storage is temporarily unavailable, please try again.";

impl SessionError {
    /// Storage-class failures: the operation was not applied
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            SessionError::Storage(_) | SessionError::Corrupt { .. } | SessionError::Serialization(_)
        )
    }

    /// Text safe to show an end user; storage details stay in the log
    pub fn user_message(&self) -> String {
        if self.is_storage() {
            STORAGE_UNAVAILABLE.to_string()
        } else {
            self.to_string()
        }
    }
}

/// Response from session operations
pub type SessionResponse<T> = Result<T, SessionError>;

/// Commands sent to a session actor
#[derive(Debug)]
pub enum SessionCommand {
    AppendMessage {
        message: Message,
        reply: oneshot::Sender<SessionResponse<Vec<Message>>>,
    },
    History {
        reply: oneshot::Sender<SessionResponse<Vec<Message>>>,
    },
    Clear {
        reply: oneshot::Sender<SessionResponse<()>>,
    },
    GetPlan {
        reply: oneshot::Sender<SessionResponse<Option<Plan>>>,
    },
    SetPlan {
        plan: Plan,
        reply: oneshot::Sender<SessionResponse<Plan>>,
    },
    UpdateStep {
        step_id: String,
        done: bool,
        reply: oneshot::Sender<SessionResponse<Option<Plan>>>,
    },

    // Shutdown
    Shutdown,
}

impl SessionCommand {
    pub fn operation(&self) -> Option<Operation> {
        match self {
            SessionCommand::AppendMessage { .. } => Some(Operation::AppendMessage),
            SessionCommand::History { .. } => Some(Operation::History),
            SessionCommand::Clear { .. } => Some(Operation::Clear),
            SessionCommand::GetPlan { .. } => Some(Operation::GetPlan),
            SessionCommand::SetPlan { .. } => Some(Operation::SetPlan),
            SessionCommand::UpdateStep { .. } => Some(Operation::UpdateStep),
            SessionCommand::Shutdown => None,
        }
    }
}
