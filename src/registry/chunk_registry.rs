use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::Chunk;
use crate::ChunkId;

/// Cached view of an active chunk
#[derive(Debug, Clone)]
pub struct ChunkEntry {
    pub chunk: Arc<Chunk>,
    /// Rows durably stored, as reported by the backend
    pub size: usize,
    pub expires_at: u64,
}

/// Index of every active chunk, i.e. chunks not yet handed to the resolve queue.
///
/// Besides the id lookup it keeps the table <-> chunk mapping used by the write path
/// to find the chunk currently accepting rows for a table. A table may have had many
/// chunks over its lifetime; only the latest registration is tracked.
#[derive(Debug, Default)]
pub struct ChunkRegistry {
    chunks: HashMap<ChunkId, ChunkEntry>,
    table_chunk: HashMap<String, ChunkId>,
    chunk_table: HashMap<ChunkId, String>,
}

impl ChunkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite by id and make it the current chunk of its table.
    pub fn register(
        &mut self,
        chunk: Arc<Chunk>,
    ) {
        trace!(chunk_id = chunk.id(), table = chunk.table(), "register chunk");

        let id = chunk.id().to_string();
        let table = chunk.table().to_string();

        self.chunk_table.insert(id.clone(), table.clone());
        self.table_chunk.insert(table, id.clone());
        self.chunks.insert(
            id,
            ChunkEntry {
                size: chunk.size(),
                expires_at: chunk.expires_at(),
                chunk,
            },
        );
    }

    /// Remove the chunk from every index. The table mapping is only dropped when
    /// it still points at this chunk.
    pub fn unregister(
        &mut self,
        id: &str,
    ) -> Option<ChunkEntry> {
        let entry = self.chunks.remove(id)?;

        if let Some(table) = self.chunk_table.remove(id) {
            if self.table_chunk.get(&table).map(String::as_str) == Some(id) {
                self.table_chunk.remove(&table);
            }
        }

        trace!(chunk_id = id, "unregister chunk");
        Some(entry)
    }

    pub fn get_one(
        &self,
        id: &str,
    ) -> Option<&ChunkEntry> {
        self.chunks.get(id)
    }

    /// Snapshot of all entries, safe to iterate while the registry changes.
    pub fn get_all(&self) -> Vec<ChunkEntry> {
        self.chunks.values().cloned().collect()
    }

    /// The chunk most recently registered for `table`, if still active.
    pub fn current_for_table(
        &self,
        table: &str,
    ) -> Option<Arc<Chunk>> {
        self.table_chunk
            .get(table)
            .and_then(|id| self.chunks.get(id))
            .map(|entry| entry.chunk.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn get_tables(&self) -> Vec<String> {
        self.table_chunk.keys().cloned().collect()
    }

    pub fn get_chunks(&self) -> Vec<ChunkId> {
        self.chunks.keys().cloned().collect()
    }

    /// Record `delta` more durable rows; returns false if the chunk is not registered.
    pub fn increase_size(
        &mut self,
        id: &str,
        delta: usize,
    ) -> bool {
        match self.chunks.get_mut(id) {
            Some(entry) => {
                entry.size += delta;
                entry.chunk.increase_size(delta);
                true
            }
            None => false,
        }
    }

    pub fn decrease_size(
        &mut self,
        id: &str,
        delta: usize,
    ) -> bool {
        match self.chunks.get_mut(id) {
            Some(entry) => {
                entry.size = entry.size.saturating_sub(delta);
                entry.chunk.decrease_size(delta);
                true
            }
            None => false,
        }
    }
}
