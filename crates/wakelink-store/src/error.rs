//! Error types for wakelink-store.

use std::path::PathBuf;

/// Result type for wakelink-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in wakelink-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The database was written by a newer schema than this build knows.
    #[error("Unsupported schema version {found} (newest supported is {supported})")]
    UnsupportedSchema { found: i32, supported: i32 },

    /// Stored timestamp is out of range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A thread panicked while holding the store lock.
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// Writes are disabled (used by [`crate::MemoryStore`] failure injection).
    #[error("Store is read-only")]
    ReadOnly,
}
