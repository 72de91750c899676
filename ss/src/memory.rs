//! In-memory KvStore
//!
//! Nothing survives the process. Used by tests and `storage.backend: memory`.
//! Supports fault and latency injection so callers can exercise their
//! failure paths without a real disk.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::{KvStore, StoreError};

/// Process-local store keyed by (namespace, key)
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, HashMap<String, String>>>,
    latency: RwLock<HashMap<String, Duration>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        debug!("MemoryStore::new: called");
        Self::default()
    }

    /// Make every subsequent `get` fail
    pub fn set_fail_reads(&self, fail: bool) {
        debug!(%fail, "MemoryStore::set_fail_reads: called");
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `put`/`delete` fail
    pub fn set_fail_writes(&self, fail: bool) {
        debug!(%fail, "MemoryStore::set_fail_writes: called");
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every call touching `namespace` by `delay`
    pub fn set_latency(&self, namespace: &str, delay: Duration) {
        debug!(%namespace, ?delay, "MemoryStore::set_latency: called");
        if let Ok(mut latency) = self.latency.write() {
            latency.insert(namespace.to_string(), delay);
        }
    }

    /// Number of successful `put`/`delete` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of keys currently stored under `namespace`
    pub fn key_count(&self, namespace: &str) -> usize {
        self.data
            .read()
            .map(|data| data.get(namespace).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    async fn delay(&self, namespace: &str) {
        let delay = self.latency.read().ok().and_then(|l| l.get(namespace).copied());
        if let Some(delay) = delay {
            debug!(%namespace, ?delay, "MemoryStore::delay: sleeping");
            tokio::time::sleep(delay).await;
        }
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        debug!(%namespace, %key, "MemoryStore::get: called");
        self.delay(namespace).await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        let data = self.data.read().map_err(|_| poisoned())?;
        Ok(data.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        debug!(%namespace, %key, value_len = value.len(), "MemoryStore::put: called");
        self.delay(namespace).await;
        self.check_writable()?;
        let mut data = self.data.write().map_err(|_| poisoned())?;
        data.entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, namespace: &str, keys: &[&str]) -> Result<(), StoreError> {
        debug!(%namespace, ?keys, "MemoryStore::delete: called");
        self.delay(namespace).await;
        self.check_writable()?;
        let mut data = self.data.write().map_err(|_| poisoned())?;
        if let Some(ns) = data.get_mut(namespace) {
            for key in keys {
                ns.remove(*key);
            }
            if ns.is_empty() {
                data.remove(namespace);
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
