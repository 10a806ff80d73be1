//! Chunk Resolver Error Hierarchy
//!
//! Defines the error types surfaced by the write path, the storage backends and
//! the background resolve loops.

use std::path::PathBuf;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by a resolve handler. Handler failures never abort sibling
/// handlers or the cleanup step.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Write path and resolve loop contract violations
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Storage backend failures (file system, serialization)
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
    /// Caching was disabled by a shutdown request
    #[error("Caching is forbidden after shutdown was requested")]
    Forbidden,

    /// A ready chunk was reached with no consumer registered
    #[error("No resolve handler registered, refusing to drop chunk {chunk_id}")]
    NoHandler { chunk_id: String },

    /// Backend save invoked with zero rows
    #[error("Refusing to save an empty row set into chunk {chunk_id}")]
    EmptySave { chunk_id: String },

    /// Table name can not be used as part of a chunk id
    #[error("Invalid table name: {0:?}")]
    InvalidTable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures during chunk operations
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// I/O failure bound to a specific chunk file
    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Row or metadata (de)serialization failures
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// The backend holds no data for the requested chunk
    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    /// A persisted chunk file could not be parsed
    #[error("Corrupted chunk file {path} at line {line}")]
    CorruptedChunk {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Blocking I/O worker failed to complete
    #[error("Storage worker failed: {0}")]
    Worker(String),
}

impl Error {
    /// Whether this error was produced because no resolve handler is registered.
    pub fn is_no_handler(&self) -> bool {
        matches!(self, Error::Cache(CacheError::NoHandler { .. }))
    }
}
