mod chunk_registry;

pub use chunk_registry::*;


use std::sync::Arc;

use parking_lot::Mutex;

/// Registry handle shared between the resolver and its storage backend.
///
/// Every mutation goes through this single lock.
pub type SharedRegistry = Arc<Mutex<ChunkRegistry>>;

pub fn new_shared_registry() -> SharedRegistry {
    Arc::new(Mutex::new(ChunkRegistry::new()))
}
