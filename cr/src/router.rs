//! SessionRouter - maps session keys to their single live actor
//!
//! The mapping is a sharded concurrent map, so resolving one key never waits
//! on a lock shared with every other key. Each key also carries a lease that
//! the live actor holds; an actor replacing an evicted one waits for it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use sessionstore::KvStore;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::domain::{Message, Plan};
use crate::instrument::OperationHook;
use crate::session::{ActorSettings, SessionError, SessionHandle, SessionResponse, SessionStorage, spawn_actor};

struct SessionSlot {
    handle: SessionHandle,
    lease: Arc<Mutex<()>>,
}

/// Process-wide registry of session actors
#[derive(Clone)]
pub struct SessionRouter {
    store: Arc<dyn KvStore>,
    settings: ActorSettings,
    slots: Arc<DashMap<String, SessionSlot>>,
    hook: Option<Arc<dyn OperationHook>>,
}

impl SessionRouter {
    pub fn new(store: Arc<dyn KvStore>, config: &SessionConfig) -> Self {
        debug!(?config, "SessionRouter::new: called");
        let idle_timeout = (config.idle_timeout_ms > 0).then(|| Duration::from_millis(config.idle_timeout_ms));
        if config.max_messages == 0 {
            warn!("session.max-messages is 0, keeping 1 message per session");
        }
        Self {
            store,
            settings: ActorSettings {
                max_messages: config.max_messages.max(1),
                idle_timeout,
                mailbox_size: config.mailbox_size,
            },
            slots: Arc::new(DashMap::new()),
            hook: None,
        }
    }

    /// Attach an observer to every handle this router hands out
    pub fn with_hook(mut self, hook: Arc<dyn OperationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Resolve the live actor for `key`, starting one if needed
    pub fn session(&self, key: &str) -> SessionHandle {
        let mut slot = self.slots.entry(key.to_string()).or_insert_with(|| {
            info!(session = %key, "Starting session actor");
            self.spawn_slot(key, Arc::new(Mutex::new(())))
        });

        if slot.handle.is_closed() {
            debug!(session = %key, "session: previous actor stopped, respawning");
            let lease = Arc::clone(&slot.lease);
            *slot = self.spawn_slot(key, lease);
        }

        slot.handle.clone()
    }

    fn spawn_slot(&self, key: &str, lease: Arc<Mutex<()>>) -> SessionSlot {
        let storage = SessionStorage::new(Arc::clone(&self.store), key);
        let tx = spawn_actor(storage, self.settings, Arc::clone(&lease));
        SessionSlot {
            handle: SessionHandle::new(key, tx, self.hook.clone()),
            lease,
        }
    }

    /// Number of keys whose actor is currently running
    pub fn live_sessions(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.handle.is_closed()).count()
    }

    /// Stop one actor; its state stays in storage and is rehydrated on next use
    pub async fn evict(&self, key: &str) -> SessionResponse<()> {
        debug!(session = %key, "evict: called");
        let handle = self.slots.get(key).map(|slot| slot.handle.clone());
        match handle {
            Some(handle) if !handle.is_closed() => handle.shutdown().await,
            _ => Ok(()),
        }
    }

    /// Stop every actor
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = self.slots.iter().map(|slot| slot.handle.clone()).collect();
        info!(count = handles.len(), "Shutting down session actors");
        for handle in handles {
            let _ = handle.shutdown().await;
        }
    }

    // === Router-facing API ===

    pub async fn append_message(&self, key: &str, message: Message) -> SessionResponse<Vec<Message>> {
        self.call(key, |h| {
            let message = message.clone();
            async move { h.append_message(message).await }
        })
        .await
    }

    pub async fn history(&self, key: &str) -> SessionResponse<Vec<Message>> {
        self.call(key, |h| async move { h.history().await }).await
    }

    pub async fn clear(&self, key: &str) -> SessionResponse<()> {
        self.call(key, |h| async move { h.clear().await }).await
    }

    pub async fn plan(&self, key: &str) -> SessionResponse<Option<Plan>> {
        self.call(key, |h| async move { h.plan().await }).await
    }

    pub async fn set_plan(&self, key: &str, plan: Plan) -> SessionResponse<Plan> {
        self.call(key, |h| {
            let plan = plan.clone();
            async move { h.set_plan(plan).await }
        })
        .await
    }

    pub async fn update_step(&self, key: &str, step_id: &str, done: bool) -> SessionResponse<Option<Plan>> {
        self.call(key, |h| async move { h.update_step(step_id, done).await })
            .await
    }

    /// Run `op` against the key's actor, retrying once if the actor stopped
    /// before the command was delivered
    async fn call<T, F, Fut>(&self, key: &str, op: F) -> SessionResponse<T>
    where
        F: Fn(SessionHandle) -> Fut,
        Fut: Future<Output = SessionResponse<T>>,
    {
        match op(self.session(key)).await {
            Err(SessionError::ActorUnavailable) => {
                warn!(session = %key, "Actor stopped before delivery, retrying on a fresh actor");
                op(self.session(key)).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PlanStep;
    use crate::instrument::{Operation, TimingRecorder};
    use sessionstore::MemoryStore;

    fn config() -> SessionConfig {
        SessionConfig {
            idle_timeout_ms: 0,
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_same_key_resolves_same_actor() {
        let router = SessionRouter::new(Arc::new(MemoryStore::new()), &config());

        router.append_message("k", Message::user("a")).await.unwrap();
        let via_handle = router.session("k").history().await.unwrap();

        assert_eq!(via_handle.len(), 1);
        assert_eq!(router.live_sessions(), 1);
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let router = SessionRouter::new(Arc::new(MemoryStore::new()), &config());

        router.append_message("a", Message::user("for a")).await.unwrap();
        router
            .set_plan("b", Plan::new("B", vec![PlanStep::new("1", "x")]))
            .await
            .unwrap();

        assert!(router.history("b").await.unwrap().is_empty());
        assert!(router.plan("a").await.unwrap().is_none());
        assert_eq!(router.live_sessions(), 2);
    }

    #[tokio::test]
    async fn test_evicted_session_rehydrates_transparently() {
        let router = SessionRouter::new(Arc::new(MemoryStore::new()), &config());
        router.append_message("k", Message::user("persisted")).await.unwrap();

        router.evict("k").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(router.live_sessions(), 0);

        let history = router.history("k").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "persisted");
        assert_eq!(router.live_sessions(), 1);
    }

    #[tokio::test]
    async fn test_idle_eviction_then_reuse() {
        let cfg = SessionConfig {
            idle_timeout_ms: 30,
            ..SessionConfig::default()
        };
        let router = SessionRouter::new(Arc::new(MemoryStore::new()), &cfg);
        router.append_message("k", Message::user("one")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(router.live_sessions(), 0);

        let log = router.append_message("k", Message::user("two")).await.unwrap();
        let contents: Vec<_> = log.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_stale_handle_call_is_retried() {
        let router = SessionRouter::new(Arc::new(MemoryStore::new()), &config());
        router.append_message("k", Message::user("one")).await.unwrap();

        let stale = router.session("k");
        stale.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(stale.history().await, Err(SessionError::ActorUnavailable)));

        assert_eq!(router.history("k").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_racing_evict_is_not_lost() {
        let store = Arc::new(MemoryStore::new());
        store.set_latency("k", Duration::from_millis(30));
        let router = SessionRouter::new(store, &config());

        let first = {
            let router = router.clone();
            tokio::spawn(async move { router.append_message("k", Message::user("a")).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        router.evict("k").await.unwrap();
        let second = {
            let router = router.clone();
            tokio::spawn(async move { router.append_message("k", Message::user("b")).await })
        };

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert_eq!(router.history("k").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_append_after_evict_succeeds() {
        let router = SessionRouter::new(Arc::new(MemoryStore::new()), &config());
        router.append_message("k", Message::user("a")).await.unwrap();

        router.evict("k").await.unwrap();
        let log = router.append_message("k", Message::user("b")).await.unwrap();

        let contents: Vec<_> = log.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_zero_retention_is_clamped() {
        let cfg = SessionConfig {
            max_messages: 0,
            ..config()
        };
        let router = SessionRouter::new(Arc::new(MemoryStore::new()), &cfg);

        router.append_message("k", Message::user("a")).await.unwrap();
        let history = router.append_message("k", Message::user("b")).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "b");
    }

    #[tokio::test]
    async fn test_hook_sees_every_operation() {
        let recorder = Arc::new(TimingRecorder::new());
        let router = SessionRouter::new(Arc::new(MemoryStore::new()), &config()).with_hook(recorder.clone());

        router.append_message("k", Message::user("a")).await.unwrap();
        router.history("k").await.unwrap();
        router.update_step("k", "1", true).await.unwrap();
        router.clear("k").await.unwrap();

        let ops: Vec<Operation> = recorder.samples().iter().map(|s| s.operation).collect();
        assert_eq!(
            ops,
            vec![
                Operation::AppendMessage,
                Operation::History,
                Operation::UpdateStep,
                Operation::Clear
            ]
        );
        assert!(recorder.samples().iter().all(|s| s.ok && s.session == "k"));
    }
}
