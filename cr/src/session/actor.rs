//! SessionActor - the single writer for one session key
//!
//! Owns the in-memory log and plan, processes commands one at a time in
//! arrival order, and persists every mutation before replying. State is
//! rehydrated from storage on the first command after the actor starts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use super::messages::{SessionCommand, SessionResponse};
use super::storage::SessionStorage;
use crate::domain::{Message, MessageLog, Plan};

/// In-memory copy of a session's durable state
#[derive(Debug, Default)]
struct SessionState {
    log: MessageLog,
    plan: Option<Plan>,
}

/// Actor settings resolved from config
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActorSettings {
    pub max_messages: usize,
    pub idle_timeout: Option<Duration>,
    pub mailbox_size: usize,
}

pub(crate) struct SessionActor {
    storage: SessionStorage,
    max_messages: usize,
    state: SessionState,
    rehydrated: bool,
}

/// Start an actor task and return its mailbox
///
/// The task holds `lease` for its whole lifetime, so a replacement actor for
/// the same key cannot start touching storage until this one has stopped.
pub(crate) fn spawn_actor(
    storage: SessionStorage,
    settings: ActorSettings,
    lease: Arc<Mutex<()>>,
) -> mpsc::Sender<SessionCommand> {
    debug!(namespace = %storage.namespace(), ?settings, "spawn_actor: called");
    let (tx, rx) = mpsc::channel(settings.mailbox_size.max(1));

    let actor = SessionActor {
        storage,
        max_messages: settings.max_messages,
        state: SessionState::default(),
        rehydrated: false,
    };

    tokio::spawn(async move {
        let _lease = lease.lock_owned().await;
        actor.run(rx, settings.idle_timeout).await;
    });

    tx
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>, idle_timeout: Option<Duration>) {
        let session = self.storage.namespace().to_string();
        debug!(%session, "SessionActor started");

        loop {
            let next = match idle_timeout {
                Some(idle) => match tokio::time::timeout(idle, rx.recv()).await {
                    Ok(cmd) => cmd,
                    Err(_) => {
                        info!(%session, ?idle, "Session idle, evicting actor");
                        self.drain(&mut rx).await;
                        break;
                    }
                },
                None => rx.recv().await,
            };

            match next {
                Some(cmd) => {
                    if !self.handle(cmd).await {
                        info!(%session, "SessionActor shutting down");
                        self.drain(&mut rx).await;
                        break;
                    }
                }
                None => {
                    debug!(%session, "run: all handles dropped");
                    break;
                }
            }
        }

        debug!(%session, "SessionActor stopped");
    }

    /// Refuse new commands, then finish whatever is already queued
    ///
    /// Senders that arrive after the close see `ActorUnavailable` and go to
    /// the next actor for this key.
    async fn drain(&mut self, rx: &mut mpsc::Receiver<SessionCommand>) {
        rx.close();
        while let Ok(cmd) = rx.try_recv() {
            debug!(session = %self.storage.namespace(), "drain: handling queued command");
            self.handle(cmd).await;
        }
    }

    /// Process one command; returns false on shutdown
    async fn handle(&mut self, cmd: SessionCommand) -> bool {
        debug!(session = %self.storage.namespace(), operation = ?cmd.operation(), "handle: called");
        match cmd {
            SessionCommand::AppendMessage { message, reply } => {
                let _ = reply.send(self.append_message(message).await);
            }
            SessionCommand::History { reply } => {
                let _ = reply.send(self.history().await);
            }
            SessionCommand::Clear { reply } => {
                let _ = reply.send(self.clear().await);
            }
            SessionCommand::GetPlan { reply } => {
                let _ = reply.send(self.plan().await);
            }
            SessionCommand::SetPlan { plan, reply } => {
                let _ = reply.send(self.set_plan(plan).await);
            }
            SessionCommand::UpdateStep { step_id, done, reply } => {
                let _ = reply.send(self.update_step(&step_id, done).await);
            }
            SessionCommand::Shutdown => return false,
        }
        true
    }

    /// Load durable state once; a failure leaves the actor uninitialized
    async fn ensure_ready(&mut self) -> SessionResponse<()> {
        if self.rehydrated {
            return Ok(());
        }

        debug!(session = %self.storage.namespace(), "ensure_ready: rehydrating");
        let mut log = self.storage.load_messages().await?;
        let plan = self.storage.load_plan().await?;

        let evicted = log.trim(self.max_messages);
        if evicted > 0 {
            warn!(
                session = %self.storage.namespace(),
                evicted, "Stored log exceeded retention bound, trimmed on load"
            );
        }

        info!(
            session = %self.storage.namespace(),
            message_count = log.len(),
            has_plan = plan.is_some(),
            "Session rehydrated"
        );
        self.state = SessionState { log, plan };
        self.rehydrated = true;
        Ok(())
    }

    async fn append_message(&mut self, message: Message) -> SessionResponse<Vec<Message>> {
        self.ensure_ready().await?;

        let mut log = self.state.log.clone();
        let evicted = log.push(message.stamped(), self.max_messages);
        self.storage.save_messages(&log).await?;

        debug!(session = %self.storage.namespace(), len = log.len(), evicted, "append_message: persisted");
        self.state.log = log;
        Ok(self.state.log.messages().to_vec())
    }

    async fn history(&mut self) -> SessionResponse<Vec<Message>> {
        self.ensure_ready().await?;
        Ok(self.state.log.messages().to_vec())
    }

    /// Nothing needs loading: the result is empty state either way
    async fn clear(&mut self) -> SessionResponse<()> {
        self.storage.delete_all().await?;
        self.state = SessionState::default();
        self.rehydrated = true;
        info!(session = %self.storage.namespace(), "Session cleared");
        Ok(())
    }

    async fn plan(&mut self) -> SessionResponse<Option<Plan>> {
        self.ensure_ready().await?;
        Ok(self.state.plan.clone())
    }

    async fn set_plan(&mut self, plan: Plan) -> SessionResponse<Plan> {
        self.ensure_ready().await?;

        let plan = plan.normalized();
        self.storage.save_plan(&plan).await?;

        debug!(session = %self.storage.namespace(), title = %plan.title, "set_plan: persisted");
        self.state.plan = Some(plan.clone());
        Ok(plan)
    }

    async fn update_step(&mut self, step_id: &str, done: bool) -> SessionResponse<Option<Plan>> {
        self.ensure_ready().await?;

        let Some(current) = &self.state.plan else {
            debug!(session = %self.storage.namespace(), %step_id, "update_step: no plan, no-op");
            return Ok(None);
        };

        let mut updated = current.clone();
        if !updated.set_step_done(step_id, done) {
            debug!(session = %self.storage.namespace(), %step_id, "update_step: unknown step, no-op");
            return Ok(Some(updated));
        }

        self.storage.save_plan(&updated).await?;
        self.state.plan = Some(updated.clone());
        Ok(Some(updated))
    }
}
