//! Processed-state persistence error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading or flushing processed state.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The JSON store file could not be read or written.
    #[error("Invalid processed-state file '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A stored value is not understood.
    #[error("Corrupt record for '{sender}': {reason}")]
    Corrupt { sender: String, reason: String },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The blocking write task panicked or was cancelled.
    #[error("Store write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The store lock was poisoned.
    #[error("Processed-state lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
