//! SessionStorage - one session's view of the durable store
//!
//! Scopes a shared [`KvStore`] to the session key and maps the two logical
//! keys to typed values.

use std::sync::Arc;

use sessionstore::KvStore;
use tracing::debug;

use super::messages::{SessionError, SessionResponse};
use crate::domain::{MessageLog, Plan};

pub const MESSAGES_KEY: &str = "messages";
pub const PLAN_KEY: &str = "plan";

/// Typed, namespace-scoped access to a session's durable keys
#[derive(Clone)]
pub struct SessionStorage {
    store: Arc<dyn KvStore>,
    namespace: String,
}

impl SessionStorage {
    pub fn new(store: Arc<dyn KvStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Persisted log, empty when nothing was written yet
    pub async fn load_messages(&self) -> SessionResponse<MessageLog> {
        debug!(namespace = %self.namespace, "load_messages: called");
        match self.store.get(&self.namespace, MESSAGES_KEY).await? {
            Some(raw) => decode(MESSAGES_KEY, &raw),
            None => Ok(MessageLog::new()),
        }
    }

    pub async fn save_messages(&self, log: &MessageLog) -> SessionResponse<()> {
        debug!(namespace = %self.namespace, count = log.len(), "save_messages: called");
        let raw = serde_json::to_string(log)?;
        self.store.put(&self.namespace, MESSAGES_KEY, &raw).await?;
        Ok(())
    }

    pub async fn load_plan(&self) -> SessionResponse<Option<Plan>> {
        debug!(namespace = %self.namespace, "load_plan: called");
        match self.store.get(&self.namespace, PLAN_KEY).await? {
            Some(raw) => decode(PLAN_KEY, &raw),
            None => Ok(None),
        }
    }

    pub async fn save_plan(&self, plan: &Plan) -> SessionResponse<()> {
        debug!(namespace = %self.namespace, step_count = plan.steps.len(), "save_plan: called");
        let raw = serde_json::to_string(plan)?;
        self.store.put(&self.namespace, PLAN_KEY, &raw).await?;
        Ok(())
    }

    /// Remove both keys in one store call
    pub async fn delete_all(&self) -> SessionResponse<()> {
        debug!(namespace = %self.namespace, "delete_all: called");
        self.store.delete(&self.namespace, &[MESSAGES_KEY, PLAN_KEY]).await?;
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(key: &str, raw: &str) -> SessionResponse<T> {
    serde_json::from_str(raw).map_err(|e| SessionError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Message, PlanStep};
    use sessionstore::MemoryStore;

    #[tokio::test]
    async fn test_absent_keys_load_as_empty() {
        let storage = SessionStorage::new(Arc::new(MemoryStore::new()), "s1");
        assert!(storage.load_messages().await.unwrap().is_empty());
        assert!(storage.load_plan().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = Arc::new(MemoryStore::new());
        let storage = SessionStorage::new(store.clone(), "s1");

        let log = MessageLog::from_messages(vec![Message::user("hi").stamped()]);
        let plan = Plan::new("T", vec![PlanStep::new("1", "a")]);
        storage.save_messages(&log).await.unwrap();
        storage.save_plan(&plan).await.unwrap();

        assert_eq!(storage.load_messages().await.unwrap(), log);
        assert_eq!(storage.load_plan().await.unwrap(), Some(plan));

        storage.delete_all().await.unwrap();
        assert_eq!(store.key_count("s1"), 0);
    }

    #[tokio::test]
    async fn test_corrupt_value_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.put("s1", MESSAGES_KEY, "not json").await.unwrap();

        let storage = SessionStorage::new(store, "s1");
        let err = storage.load_messages().await.unwrap_err();
        assert!(matches!(err, SessionError::Corrupt { ref key, .. } if key == MESSAGES_KEY));
        assert!(err.is_storage());
    }
}
