//! Store error types

use thiserror::Error;

/// Errors from storage backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage task failed: {0}")]
    Task(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
