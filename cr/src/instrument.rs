//! Optional timing hooks around session operations
//!
//! Hooks observe each call made through a [`SessionHandle`](crate::session::SessionHandle),
//! measured from the caller's side (queueing plus execution). They never see
//! or alter session state.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

/// The router-facing session operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    AppendMessage,
    History,
    Clear,
    GetPlan,
    SetPlan,
    UpdateStep,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::AppendMessage => "append-message",
            Operation::History => "history",
            Operation::Clear => "clear",
            Operation::GetPlan => "get-plan",
            Operation::SetPlan => "set-plan",
            Operation::UpdateStep => "update-step",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer invoked after every session operation completes
pub trait OperationHook: Send + Sync {
    fn on_operation(&self, session: &str, operation: Operation, elapsed: Duration, ok: bool);
}

/// Emits one debug event per operation
#[derive(Debug, Default)]
pub struct TracingHook;

impl OperationHook for TracingHook {
    fn on_operation(&self, session: &str, operation: Operation, elapsed: Duration, ok: bool) {
        debug!(
            %session,
            %operation,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            ok,
            "session operation"
        );
    }
}

/// One recorded operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSample {
    pub session: String,
    pub operation: Operation,
    pub elapsed: Duration,
    pub ok: bool,
}

/// Keeps every sample in memory
#[derive(Debug, Default)]
pub struct TimingRecorder {
    samples: Mutex<Vec<OperationSample>>,
}

impl TimingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<OperationSample> {
        self.samples.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl OperationHook for TimingRecorder {
    fn on_operation(&self, session: &str, operation: Operation, elapsed: Duration, ok: bool) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.push(OperationSample {
                session: session.to_string(),
                operation,
                elapsed,
                ok,
            });
        }
    }
}
