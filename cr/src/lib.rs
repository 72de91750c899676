//! ChatRelay - durable per-session chat state in front of a text model
//!
//! Every session key is served by exactly one actor task that owns the
//! session's message log and optional plan. The actor serializes all
//! operations on that state and writes every change through to the store
//! before acknowledging it, so a restarted process picks up where the last
//! one stopped.
//!
//! # Modules
//!
//! - [`domain`] - Message, MessageLog, Plan and PlanStep
//! - [`extract`] - Plan extraction from free-form model output
//! - [`session`] - The per-session actor and its handle
//! - [`router`] - Session key to actor mapping
//! - [`chat`] - Chat turns and plan generation against the model
//! - [`llm`] - Model client trait and OpenAI-compatible implementation
//! - [`instrument`] - Timing hooks around session operations
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod chat;
pub mod cli;
pub mod config;
pub mod domain;
pub mod extract;
pub mod instrument;
pub mod llm;
pub mod router;
pub mod session;

pub use chat::{ChatError, ChatRequest, ChatResponse, ChatService, DebugMetrics, PlanOutcome};
pub use config::Config;
pub use domain::{Message, MessageLog, Plan, PlanStep, Role};
pub use extract::{ExtractError, PlanExtractor, extract_plan};
pub use router::SessionRouter;
pub use session::{SessionError, SessionHandle};
