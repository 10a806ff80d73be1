use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::trace;

use crate::file_io;
use crate::BackendKind;
use crate::CacheError;
use crate::Chunk;
use crate::ChunkMetadata;
use crate::LoadedChunk;
use crate::Result;
use crate::Row;
use crate::SharedRegistry;
use crate::StorageBackend;
use crate::StorageError;
use crate::WriteGate;

pub(crate) const CHUNK_FILE_EXTENSION: &str = "txt";

/// One `save` whose rows are not yet on disk
#[derive(Debug)]
struct PendingWrite {
    chunk_id: String,
    path: PathBuf,
    header: Vec<u8>,
    body: Vec<u8>,
}

impl PendingWrite {
    fn write(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            file_io::create_dir_if_not_exist(dir)?;
        }
        file_io::append_with_header(&self.path, &self.header, &self.body)
    }
}

/// Disk backend: one `<chunk id>.txt` file per chunk.
///
/// Line 1 is the JSON metadata header (`{"table":..,"expiresAt":..}`), every
/// following line one JSON-encoded row, in append order.
///
/// Each `save` is recorded as a pending write before it is handed to a blocking
/// worker. Whoever removes a pending write from the map (the worker or
/// [`StorageBackend::backup`]) writes it, always under `io_lock`, so a write is
/// never lost to shutdown and never duplicated.
#[derive(Debug)]
pub struct DiskBackend {
    output_directory: PathBuf,
    registry: SharedRegistry,
    gate: WriteGate,
    pending: Arc<DashMap<u64, PendingWrite>>,
    next_op: AtomicU64,
    io_lock: Arc<Mutex<()>>,
}

impl DiskBackend {
    pub fn new(
        output_directory: PathBuf,
        registry: SharedRegistry,
    ) -> Self {
        Self {
            output_directory,
            registry,
            gate: WriteGate::new(),
            pending: Arc::new(DashMap::new()),
            next_op: AtomicU64::new(0),
            io_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub(crate) fn chunk_path(
        &self,
        chunk_id: &str,
    ) -> PathBuf {
        self.output_directory
            .join(format!("{}.{}", chunk_id, CHUNK_FILE_EXTENSION))
    }

    /// Writes accepted but not yet flushed
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    fn encode(
        chunk: &Chunk,
        rows: &[Row],
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut header =
            serde_json::to_vec(&chunk.metadata()).map_err(StorageError::Serialization)?;
        header.push(b'\n');

        let mut body = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut body, row).map_err(StorageError::Serialization)?;
            body.push(b'\n');
        }
        Ok((header, body))
    }

    fn parse(
        path: &Path,
        content: &str,
    ) -> Result<LoadedChunk> {
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let (header_no, header) = lines
            .next()
            .ok_or_else(|| StorageError::ChunkNotFound(path.display().to_string()))?;
        let metadata: ChunkMetadata =
            serde_json::from_str(header).map_err(|e| StorageError::CorruptedChunk {
                path: path.to_path_buf(),
                line: header_no + 1,
                source: e,
            })?;

        let mut rows = Vec::new();
        for (no, line) in lines {
            let row: Row = serde_json::from_str(line).map_err(|e| StorageError::CorruptedChunk {
                path: path.to_path_buf(),
                line: no + 1,
                source: e,
            })?;
            rows.push(row);
        }

        Ok(LoadedChunk { metadata, rows })
    }
}

#[async_trait]
impl StorageBackend for DiskBackend {
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
        let (header, body) = Self::encode(chunk, &rows)?;

        let op_id = self.next_op.fetch_add(1, Ordering::SeqCst);
        self.pending.insert(
            op_id,
            PendingWrite {
                chunk_id: chunk.id().to_string(),
                path: self.chunk_path(chunk.id()),
                header,
                body,
            },
        );

        let pending = self.pending.clone();
        let io_lock = self.io_lock.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let _io = io_lock.lock();
            match pending.remove(&op_id) {
                Some((_, op)) => op.write(),
                // Already flushed by a backup pass
                None => Ok(()),
            }
        })
        .await;

        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Failed to append rows to chunk file: {:?}", e);
                return Err(e);
            }
            Err(e) => {
                self.pending.remove(&op_id);
                return Err(StorageError::Worker(e.to_string()).into());
            }
        }

        if !self.registry.lock().increase_size(chunk.id(), count) {
            chunk.increase_size(count);
        }
        trace!("appended {} rows to disk", count);
        Ok(())
    }

    async fn load(
        &self,
        chunk_id: &str,
    ) -> Result<LoadedChunk> {
        let path = self.chunk_path(chunk_id);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| StorageError::PathError {
                path: path.clone(),
                source: e,
            })?;

        Self::parse(&path, &content)
    }

    async fn restore(&self) -> Result<usize> {
        let exists = tokio::fs::try_exists(&self.output_directory)
            .await
            .map_err(|e| StorageError::PathError {
                path: self.output_directory.clone(),
                source: e,
            })?;
        if !exists {
            debug!("nothing to restore, {:?} does not exist", self.output_directory);
            return Ok(0);
        }

        let files =
            file_io::list_files_with_extension(&self.output_directory, CHUNK_FILE_EXTENSION)
                .await?;

        let mut restored = 0;
        for path in files {
            let Some(chunk_id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };

            let loaded = self.load(&chunk_id).await?;
            let chunk = Chunk::existing(chunk_id, loaded.metadata, loaded.rows.len());
            debug!(chunk_id = chunk.id(), size = chunk.size(), "restored chunk");

            self.registry.lock().register(Arc::new(chunk));
            restored += 1;
        }

        info!("restored {} chunks from {:?}", restored, self.output_directory);
        Ok(restored)
    }

    async fn cleanup(
        &self,
        chunk_id: &str,
    ) -> Result<()> {
        file_io::delete_file(&self.chunk_path(chunk_id)).await
    }

    fn count_rows(
        &self,
        chunk_id: &str,
    ) -> usize {
        self.registry.lock().get_one(chunk_id).map(|e| e.size).unwrap_or(0)
    }

    fn backup(&self) -> Result<()> {
        self.gate.block();
        info!("backup started, {} pending writes", self.pending.len());

        let result = {
            let _io = self.io_lock.lock();

            let mut op_ids: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
            op_ids.sort_unstable();

            let mut result = Ok(());
            for op_id in op_ids {
                if let Some((_, op)) = self.pending.remove(&op_id) {
                    if let Err(e) = op.write() {
                        error!(chunk_id = %op.chunk_id, "backup write failed: {:?}", e);
                        if result.is_ok() {
                            result = Err(e);
                        }
                    }
                }
            }
            result
        };

        self.gate.unblock();
        info!("backup finished");
        result
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
        BackendKind::Disk
    }
}
