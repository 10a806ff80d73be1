use std::fmt;
use std::sync::Arc;

use super::Chunk;
use super::Row;
use crate::Result;
use crate::StorageBackend;

/// Read-only view of a chunk handed to resolve handlers.
///
/// Rows are loaded on demand. The backend cleans the chunk up once every handler
/// has returned, so rows must be loaded from within the handler.
#[derive(Clone)]
pub struct ResolvedChunk {
    id: String,
    table: String,
    size: usize,
    created_at: u64,
    expires_at: u64,
    backend: Arc<dyn StorageBackend>,
}

impl ResolvedChunk {
    pub(crate) fn new(
        chunk: &Chunk,
        backend: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            id: chunk.id().to_string(),
            table: chunk.table().to_string(),
            size: chunk.size(),
            created_at: chunk.created_at(),
            expires_at: chunk.expires_at(),
            backend,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// All rows of the chunk, in append order.
    pub async fn load_rows(&self) -> Result<Vec<Row>> {
        Ok(self.backend.load(&self.id).await?.rows)
    }
}

impl fmt::Debug for ResolvedChunk {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ResolvedChunk")
            .field("id", &self.id)
            .field("table", &self.table)
            .field("size", &self.size)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
