//! Error types for the document store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by store operations. The sync engine treats these the
/// same as fetch failures: retry up to the ceiling, then leave the unit
/// missing for the next invocation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open or create the database file.
    #[error("failed to open store at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Failed to run a schema migration.
    #[error("store migration failed: {0}")]
    Migration(#[from] rusqlite::Error),

    /// A query or write failed.
    #[error("store operation failed: {0}")]
    Query(String),

    /// Failed to spawn a blocking task.
    #[error("failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),

    /// The store schema version is newer than this binary supports.
    #[error("store schema version {found} is newer than supported version {expected}")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },
}

impl StoreError {
    /// Create a Query error from a rusqlite error.
    pub fn query(source: rusqlite::Error) -> Self {
        Self::Query(source.to_string())
    }
}
