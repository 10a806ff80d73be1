mod chunk;
mod resolved_chunk;

pub use chunk::*;
pub use resolved_chunk::*;


use serde::Deserialize;
use serde::Serialize;

/// Opaque key-value record buffered by the resolver
pub type Row = serde_json::Map<String, serde_json::Value>;

pub type ChunkId = String;

/// Header persisted with every chunk; enough to rebuild a [`Chunk`] after restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub table: String,
    pub expires_at: u64,
}
