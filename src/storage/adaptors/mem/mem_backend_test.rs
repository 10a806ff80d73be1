use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::new_shared_registry;
use crate::test_utils::rows;
use crate::CacheError;
use crate::Chunk;
use crate::Error;
use crate::SharedRegistry;
use crate::StorageBackend;
use crate::StorageError;

fn setup() -> (SharedRegistry, MemoryBackend, Arc<Chunk>) {
    let registry = new_shared_registry();
    let backend = MemoryBackend::new(registry.clone());
    let chunk = Arc::new(Chunk::scratch("events", 10_000));
    registry.lock().register(chunk.clone());
    (registry, backend, chunk)
}

#[tokio::test]
async fn test_save_then_load_keeps_append_order() {
    let (_registry, backend, chunk) = setup();

    backend.save(&chunk, rows(2)).await.expect("should succeed");
    backend
        .save(&chunk, crate::test_utils::rows_from(2, 3))
        .await
        .expect("should succeed");

    let loaded = backend.load(chunk.id()).await.expect("should succeed");
    assert_eq!(loaded.rows, rows(5));
    assert_eq!(loaded.metadata, chunk.metadata());
    assert_eq!(backend.count_rows(chunk.id()), 5);
    assert_eq!(chunk.size(), 5);
    assert!(chunk.is_consistent());
}

#[tokio::test]
async fn test_save_rejects_empty_rows() {
    let (_registry, backend, chunk) = setup();

    let result = backend.save(&chunk, Vec::new()).await;
    assert!(matches!(
        result,
        Err(Error::Cache(CacheError::EmptySave { .. }))
    ));
    assert_eq!(backend.stored_chunks(), 0);
}

#[tokio::test]
async fn test_load_unknown_chunk() {
    let (_registry, backend, _chunk) = setup();

    let result = backend.load("missing").await;
    assert!(matches!(
        result,
        Err(Error::Storage(StorageError::ChunkNotFound(_)))
    ));
}

#[tokio::test]
async fn test_cleanup_releases_rows() {
    let (_registry, backend, chunk) = setup();
    backend.save(&chunk, rows(3)).await.expect("should succeed");
    assert_eq!(backend.stored_chunks(), 1);

    backend.cleanup(chunk.id()).await.expect("should succeed");
    assert_eq!(backend.stored_chunks(), 0);
    // Releasing an unknown chunk is not an error
    backend.cleanup(chunk.id()).await.expect("should succeed");
}

#[tokio::test]
async fn test_save_into_unregistered_chunk_updates_chunk() {
    let registry = new_shared_registry();
    let backend = MemoryBackend::new(registry);
    let chunk = Arc::new(Chunk::scratch("events", 10_000));

    backend.save(&chunk, rows(4)).await.expect("should succeed");
    assert_eq!(chunk.size(), 4);
    assert_eq!(backend.count_rows(chunk.id()), 0);
}

#[tokio::test]
async fn test_restore_and_backup_are_noops() {
    let (registry, backend, _chunk) = setup();

    assert_eq!(backend.restore().await.expect("should succeed"), 0);
    backend.backup().expect("should succeed");
    assert_eq!(registry.lock().len(), 1);
}

#[tokio::test]
async fn test_save_waits_for_write_gate() {
    let (_registry, backend, chunk) = setup();
    let backend = Arc::new(backend);

    backend.block_writes();
    assert!(!backend.is_writable());

    let saver = {
        let backend = backend.clone();
        let chunk = chunk.clone();
        tokio::spawn(async move { backend.save(&chunk, rows(1)).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.stored_chunks(), 0);

    backend.unblock_writes();
    saver.await.expect("should succeed").expect("should succeed");
    assert_eq!(backend.count_rows(chunk.id()), 1);
}
