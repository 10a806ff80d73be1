use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::BackendKind;
use crate::Chunk;
use crate::LoadedChunk;
use crate::MockStorageBackend;
use crate::Result;
use crate::Row;
use crate::SharedRegistry;
use crate::StorageBackend;
use crate::StorageError;

/// Wraps a backend to make saves slow or failing.
///
/// A slow save holds the chunk inconsistent for `delay` before delegating.
pub struct SlowBackend {
    inner: Arc<dyn StorageBackend>,
    delay: Duration,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
    last_save_done: Mutex<Option<Instant>>,
}

impl SlowBackend {
    pub fn new(
        inner: Arc<dyn StorageBackend>,
        delay: Duration,
    ) -> Self {
        Self {
            inner,
            delay,
            fail_saves: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
            last_save_done: Mutex::new(None),
        }
    }

    pub fn fail_saves(
        &self,
        fail: bool,
    ) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Instant recorded right before the last successful save released its write
    pub fn last_save_done(&self) -> Option<Instant> {
        *self.last_save_done.lock()
    }
}

#[async_trait]
impl StorageBackend for SlowBackend {
    async fn save(
        &self,
        chunk: &Arc<Chunk>,
        rows: Vec<Row>,
    ) -> Result<()> {
        let _write = chunk.enter_write();
        tokio::time::sleep(self.delay).await;
        self.saves.fetch_add(1, Ordering::SeqCst);

        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Worker("injected save failure".into()).into());
        }

        self.inner.save(chunk, rows).await?;
        *self.last_save_done.lock() = Some(Instant::now());
        Ok(())
    }

    async fn load(
        &self,
        chunk_id: &str,
    ) -> Result<LoadedChunk> {
        self.inner.load(chunk_id).await
    }

    async fn restore(&self) -> Result<usize> {
        self.inner.restore().await
    }

    async fn cleanup(
        &self,
        chunk_id: &str,
    ) -> Result<()> {
        self.inner.cleanup(chunk_id).await
    }

    fn count_rows(
        &self,
        chunk_id: &str,
    ) -> usize {
        self.inner.count_rows(chunk_id)
    }

    fn backup(&self) -> Result<()> {
        self.inner.backup()
    }

    fn is_writable(&self) -> bool {
        self.inner.is_writable()
    }

    fn block_writes(&self) {
        self.inner.block_writes()
    }

    fn unblock_writes(&self) {
        self.inner.unblock_writes()
    }

    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }
}

/// Mock that keeps the registry sizes up to date like a real backend would.
///
/// `cleanup` and `load` expectations are left to the caller.
pub fn mock_backend_tracking(registry: SharedRegistry) -> MockStorageBackend {
    let mut backend = MockStorageBackend::new();

    let save_registry = registry.clone();
    backend.expect_save().returning(move |chunk, rows| {
        if !save_registry.lock().increase_size(chunk.id(), rows.len()) {
            chunk.increase_size(rows.len());
        }
        Ok(())
    });
    backend
        .expect_count_rows()
        .returning(move |id| registry.lock().get_one(id).map(|e| e.size).unwrap_or(0));
    backend.expect_restore().returning(|| Ok(0));
    backend.expect_backup().returning(|| Ok(()));
    backend.expect_kind().returning(|| BackendKind::Memory);
    backend
}
