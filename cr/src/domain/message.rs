//! Chat messages and the bounded message log

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default retention bound for a session's message log
pub const DEFAULT_MAX_MESSAGES: usize = 25;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message
///
/// Timestamps are kept at millisecond precision, which is also the wire and
/// storage precision, so a rehydrated message compares equal to the one that
/// was appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Set an explicit timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Fill in `now` when no timestamp was given, truncating to milliseconds
    pub fn stamped(mut self) -> Self {
        let ts = self.timestamp.unwrap_or_else(Utc::now);
        self.timestamp = Some(ts.trunc_subsecs(3));
        self
    }
}

/// Insertion-ordered message history with FIFO trimming
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Append and evict the oldest entries beyond `limit`; returns the eviction count
    pub fn push(&mut self, message: Message, limit: usize) -> usize {
        self.messages.push(message);
        self.trim(limit)
    }

    /// Keep only the newest `limit` messages
    pub fn trim(&mut self, limit: usize) -> usize {
        let excess = self.messages.len().saturating_sub(limit);
        if excess > 0 {
            debug!(excess, limit, "MessageLog::trim: evicting oldest messages");
            self.messages.drain(..excess);
        }
        excess
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
