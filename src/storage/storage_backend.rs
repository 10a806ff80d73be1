use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::BackendKind;
use crate::Chunk;
use crate::ChunkMetadata;
use crate::Result;
use crate::Row;

/// Everything stored for one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedChunk {
    pub metadata: ChunkMetadata,
    pub rows: Vec<Row>,
}

/// Storage contract shared by the in-memory and disk variants.
///
/// Implementations must:
/// - hold the chunk inconsistent (see [`Chunk::enter_write`]) for the whole `save`;
/// - report new rows to the registry only once they are durable from the backend's
///   point of view;
/// - reject empty saves before touching storage;
/// - wait for the write gate before saving while it is closed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Append `rows` to the chunk's storage.
    async fn save(
        &self,
        chunk: &Arc<Chunk>,
        rows: Vec<Row>,
    ) -> Result<()>;

    /// All rows currently stored for the chunk plus its metadata.
    async fn load(
        &self,
        chunk_id: &str,
    ) -> Result<LoadedChunk>;

    /// Re-register every previously persisted chunk. Returns how many were found.
    async fn restore(&self) -> Result<usize>;

    /// Irreversibly delete the chunk's stored rows.
    async fn cleanup(
        &self,
        chunk_id: &str,
    ) -> Result<()>;

    /// Durable row count, served from the registry cache.
    fn count_rows(
        &self,
        chunk_id: &str,
    ) -> usize;

    /// Synchronously flush every buffered write. Called on graceful termination.
    fn backup(&self) -> Result<()>;

    fn is_writable(&self) -> bool;

    /// Close the write gate; subsequent saves wait until it reopens.
    fn block_writes(&self);

    fn unblock_writes(&self);

    fn kind(&self) -> BackendKind;
}
