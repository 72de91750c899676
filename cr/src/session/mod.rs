//! Per-session durable actors
//!
//! One actor task per live session key owns that session's message log and
//! plan. All access goes through a [`SessionHandle`]; the actor serializes
//! commands and writes through to storage before replying.

mod actor;
mod handle;
mod messages;
mod storage;

pub(crate) use actor::{ActorSettings, spawn_actor};
pub use handle::SessionHandle;
pub use messages::{STORAGE_UNAVAILABLE, SessionCommand, SessionError, SessionResponse};
pub use storage::{MESSAGES_KEY, PLAN_KEY, SessionStorage};
