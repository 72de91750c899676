//! SQLite-backed KvStore
//!
//! One table keyed by (namespace, key). Calls run on the blocking pool so the
//! async callers never stall a runtime worker on disk I/O.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::{KvStore, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS session_kv (
    namespace  TEXT NOT NULL,
    key        TEXT NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (namespace, key)
);
"#;

/// Durable store in a single SQLite file
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "SqliteStore::open: called");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        debug!(%mode, "SqliteStore::open: journal mode set");
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        debug!("SqliteStore::open_in_memory: called");
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        info!(path = ?path, "SqliteStore opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Database file path, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        debug!(%namespace, %key, "SqliteStore::get: called");
        let (namespace, key) = (namespace.to_string(), key.to_string());
        self.with_conn(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM session_kv WHERE namespace = ?1 AND key = ?2",
                    params![namespace, key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        debug!(%namespace, %key, value_len = value.len(), "SqliteStore::put: called");
        let (namespace, key, value) = (namespace.to_string(), key.to_string(), value.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO session_kv (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![namespace, key, value, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, namespace: &str, keys: &[&str]) -> Result<(), StoreError> {
        debug!(%namespace, ?keys, "SqliteStore::delete: called");
        let namespace = namespace.to_string();
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for key in &keys {
                tx.execute(
                    "DELETE FROM session_kv WHERE namespace = ?1 AND key = ?2",
                    params![namespace, key],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
