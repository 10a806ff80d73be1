use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;
use tracing::trace;

use crate::BackendKind;
use crate::CacheError;
use crate::Chunk;
use crate::ChunkId;
use crate::ChunkMetadata;
use crate::LoadedChunk;
use crate::Result;
use crate::Row;
use crate::SharedRegistry;
use crate::StorageBackend;
use crate::StorageError;
use crate::WriteGate;

#[derive(Debug)]
struct StoredChunk {
    metadata: ChunkMetadata,
    rows: Vec<Row>,
}

/// Process-memory backend.
///
/// Zero durability: every unresolved chunk is lost when the process dies, and
/// `backup`/`restore` have nothing to do.
#[derive(Debug)]
pub struct MemoryBackend {
    registry: SharedRegistry,
    chunks: DashMap<ChunkId, StoredChunk>,
    gate: WriteGate,
}

impl MemoryBackend {
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            registry,
            chunks: DashMap::new(),
            gate: WriteGate::new(),
        }
    }

    /// Number of chunks currently holding rows
    pub fn stored_chunks(&self) -> usize {
        self.chunks.len()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[instrument(skip(self, chunk, rows), fields(chunk_id = chunk.id(), rows = rows.len()))]
    async fn save(
        &self,
        chunk: &Arc<Chunk>,
        rows: Vec<Row>,
    ) -> Result<()> {
        if rows.is_empty() {
            return Err(CacheError::EmptySave {
                chunk_id: chunk.id().to_string(),
            }
            .into());
        }

        self.gate.wait_writable().await;
        let _write = chunk.enter_write();

        let count = rows.len();
        self.chunks
            .entry(chunk.id().to_string())
            .or_insert_with(|| StoredChunk {
                metadata: chunk.metadata(),
                rows: Vec::new(),
            })
            .rows
            .extend(rows);

        if !self.registry.lock().increase_size(chunk.id(), count) {
            chunk.increase_size(count);
        }
        trace!("stored {} rows in memory", count);
        Ok(())
    }

    async fn load(
        &self,
        chunk_id: &str,
    ) -> Result<LoadedChunk> {
        let stored = self
            .chunks
            .get(chunk_id)
            .ok_or_else(|| StorageError::ChunkNotFound(chunk_id.to_string()))?;

        Ok(LoadedChunk {
            metadata: stored.metadata.clone(),
            rows: stored.rows.clone(),
        })
    }

    async fn restore(&self) -> Result<usize> {
        Ok(0)
    }

    async fn cleanup(
        &self,
        chunk_id: &str,
    ) -> Result<()> {
        self.chunks.remove(chunk_id);
        Ok(())
    }

    fn count_rows(
        &self,
        chunk_id: &str,
    ) -> usize {
        self.registry.lock().get_one(chunk_id).map(|e| e.size).unwrap_or(0)
    }

    fn backup(&self) -> Result<()> {
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.gate.is_writable()
    }

    fn block_writes(&self) {
        self.gate.block();
    }

    fn unblock_writes(&self) {
        self.gate.unblock();
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }
}
