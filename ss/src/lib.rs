//! SessionStore - namespaced durable key-value storage
//!
//! Every chat session owns one namespace (its session key) and a handful of
//! logical keys inside it. Values are opaque text; callers serialize JSON.
//!
//! # Backends
//!
//! - [`SqliteStore`] - durable, single-file SQLite database
//! - [`MemoryStore`] - process-local map for tests and ephemeral runs

use async_trait::async_trait;

mod error;
mod memory;
mod sqlite;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Durable get/put/delete scoped by namespace
///
/// Implementations must make each call atomic: a failed `put` leaves the
/// previous value in place and a failed `delete` removes nothing.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value, `None` if the key was never written or was deleted
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite a value
    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove several keys in one atomic step; missing keys are ignored
    async fn delete(&self, namespace: &str, keys: &[&str]) -> Result<(), StoreError>;
}
