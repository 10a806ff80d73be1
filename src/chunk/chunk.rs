use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::ChunkMetadata;
use crate::time::get_now_as_millis;
use crate::utils::id;

/// Lifecycle position of a chunk once it has left the active set.
///
/// Transitions only move forward:
/// `Active -> Queued -> Resolving -> Done`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStage {
    /// Registered and visible to the write path
    Active = 0,
    /// Waiting in the resolve queue
    Queued = 1,
    /// Being delivered to handlers
    Resolving = 2,
    /// Delivered and cleaned up
    Done = 3,
}

impl From<u8> for ChunkStage {
    fn from(value: u8) -> Self {
        match value {
            0 => ChunkStage::Active,
            1 => ChunkStage::Queued,
            2 => ChunkStage::Resolving,
            _ => ChunkStage::Done,
        }
    }
}

/// How the chunk came into existence. Behavior is identical for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOrigin {
    /// Created by the write path
    Scratch,
    /// Rebuilt from persisted data on restart
    Existing,
}

/// A bounded batch of rows for one table.
///
/// All mutable state is atomic so a chunk can be shared between the write path,
/// the storage backend and the resolve loops behind an `Arc`.
///
/// - `size` counts rows the backend has durably stored.
/// - `reserved` counts rows admitted by the write path, including those still in
///   flight. Admission never lets it exceed the configured limit.
/// - `writers` counts in-flight appends; the chunk is consistent when it is zero.
#[derive(Debug)]
pub struct Chunk {
    id: String,
    table: String,
    created_at: u64,
    expires_at: u64,
    origin: ChunkOrigin,

    size: AtomicUsize,
    reserved: AtomicUsize,
    writers: AtomicUsize,
    blocked: AtomicBool,
    force_ready: AtomicBool,
    stage: AtomicU8,
}

impl Chunk {
    /// New empty chunk for `table` living at least `live_at_least_ms`.
    pub fn scratch(
        table: &str,
        live_at_least_ms: u64,
    ) -> Self {
        let created_at = get_now_as_millis();
        Self::build(
            id::chunk_id(table, created_at),
            table.to_string(),
            created_at,
            created_at.saturating_add(live_at_least_ms),
            0,
            ChunkOrigin::Scratch,
        )
    }

    /// Chunk rebuilt from persisted metadata holding `size` rows.
    pub fn existing(
        id: String,
        metadata: ChunkMetadata,
        size: usize,
    ) -> Self {
        Self::build(
            id,
            metadata.table,
            get_now_as_millis(),
            metadata.expires_at,
            size,
            ChunkOrigin::Existing,
        )
    }

    fn build(
        id: String,
        table: String,
        created_at: u64,
        expires_at: u64,
        size: usize,
        origin: ChunkOrigin,
    ) -> Self {
        Self {
            id,
            table,
            created_at,
            expires_at,
            origin,
            size: AtomicUsize::new(size),
            reserved: AtomicUsize::new(size),
            writers: AtomicUsize::new(0),
            blocked: AtomicBool::new(false),
            force_ready: AtomicBool::new(false),
            stage: AtomicU8::new(ChunkStage::Active as u8),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    pub fn origin(&self) -> ChunkOrigin {
        self.origin
    }

    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            table: self.table.clone(),
            expires_at: self.expires_at,
        }
    }

    /// Durably stored row count
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Rows admitted so far, in flight included
    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    pub(crate) fn increase_size(
        &self,
        delta: usize,
    ) {
        self.size.fetch_add(delta, Ordering::AcqRel);
    }

    pub(crate) fn decrease_size(
        &self,
        delta: usize,
    ) {
        let _ = self
            .size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| Some(s.saturating_sub(delta)));
        self.release(delta);
    }

    /// Admit up to `wanted` rows without crossing `limit`; returns the admitted count.
    pub(crate) fn reserve(
        &self,
        wanted: usize,
        limit: usize,
    ) -> usize {
        let mut admitted = 0;
        let _ = self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |reserved| {
                admitted = wanted.min(limit.saturating_sub(reserved));
                Some(reserved + admitted)
            });
        admitted
    }

    /// Give back admitted rows that never reached storage
    pub(crate) fn release(
        &self,
        count: usize,
    ) {
        let _ = self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| Some(r.saturating_sub(count)));
    }

    /// `now >= expires_at`, inclusive at the boundary.
    pub fn is_expired_at(
        &self,
        now: u64,
    ) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(get_now_as_millis())
    }

    /// Ready when forced, expired, or holding at least `limit` rows.
    pub fn is_ready(
        &self,
        row_count: usize,
        limit: usize,
        now: u64,
    ) -> bool {
        self.force_ready.load(Ordering::Acquire) || self.is_expired_at(now) || row_count >= limit
    }

    pub fn set_ready(&self) {
        self.force_ready.store(true, Ordering::Release);
    }

    pub fn is_consistent(&self) -> bool {
        self.writers.load(Ordering::SeqCst) == 0
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    pub fn is_unblocked(&self) -> bool {
        !self.is_blocked()
    }

    /// Reject any further appends
    pub fn block(&self) {
        self.blocked.store(true, Ordering::SeqCst);
    }

    pub fn unblock(&self) {
        self.blocked.store(false, Ordering::SeqCst);
    }

    /// Mark an append as in flight until the returned guard is dropped.
    pub fn enter_write(self: &Arc<Self>) -> WriteGuard {
        self.writers.fetch_add(1, Ordering::SeqCst);
        WriteGuard { chunk: self.clone() }
    }

    pub fn stage(&self) -> ChunkStage {
        ChunkStage::from(self.stage.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`; fails if another party already moved the chunk.
    pub(crate) fn transition(
        &self,
        from: ChunkStage,
        to: ChunkStage,
    ) -> bool {
        self.stage
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Holds a chunk inconsistent for the lifetime of one append.
#[derive(Debug)]
pub struct WriteGuard {
    chunk: Arc<Chunk>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.chunk.writers.fetch_sub(1, Ordering::SeqCst);
    }
}
