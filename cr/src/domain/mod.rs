//! Domain types shared by the session actor, the router and the chat flow

mod message;
mod plan;

pub use message::{DEFAULT_MAX_MESSAGES, Message, MessageLog, Role};
pub use plan::{Plan, PlanStep};
