use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use arc_swap::ArcSwap;
use autometrics::autometrics;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::trace;
use tracing::warn;

use super::AsyncHandler;
use super::HandlerKey;
use super::ResolveHandler;
use super::SyncHandler;
use crate::build_backend;
use crate::new_shared_registry;
use crate::time::get_now_as_millis;
use crate::utils::id;
use crate::CacheError;
use crate::Chunk;
use crate::ChunkStage;
use crate::Error;
use crate::HandlerError;
use crate::Queue;
use crate::ResolvedChunk;
use crate::ResolverConfig;
use crate::Result;
use crate::Row;
use crate::SharedRegistry;
use crate::StorageBackend;
use crate::WriteGuard;
use crate::ACTIVE_CHUNKS;
use crate::API_SLO;
use crate::CHUNKS_RESOLVED;
use crate::CLEANUP_FAILURES;
use crate::HANDLER_FAILURES;
use crate::RESOLVE_DURATION_MS;
use crate::ROWS_CACHED;

type HandlerList = Vec<(HandlerKey, Arc<dyn ResolveHandler>)>;

/// Row-batching write buffer.
///
/// Rows passed to [`ChunkResolver::cache`] are grouped per table into chunks bounded
/// by `chunk_size` rows and `chunk_life_ms`. Two background loops move chunks along:
///
/// - the readiness loop scans the registry, blocks chunks that are expired or full,
///   and queues them once no append is in flight;
/// - the hand-off loop delivers each queued chunk to every registered handler, then
///   asks the backend to clean it up.
///
/// Both loops are tokio tasks spawned on first use and stopped by [`ChunkResolver::stop`]
/// or when the resolver is dropped.
pub struct ChunkResolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    config: ResolverConfig,
    registry: SharedRegistry,
    backend: Arc<dyn StorageBackend>,
    resolve_queue: Mutex<Queue<Arc<Chunk>>>,
    handlers: ArcSwap<HandlerList>,

    caching_enabled: AtomicBool,
    // Set when the hand-off loop gave up for lack of handlers
    handler_missing: AtomicBool,

    stop: CancellationToken,
    registry_changed: Notify,
    queue_changed: Notify,
    watching_registry: AtomicBool,
    watching_queue: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<Result<()>>>>,
    runtime: Handle,
}

impl ChunkResolver {
    /// Build the configured backend, restore persisted chunks and start watching.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new(config: ResolverConfig) -> Result<Self> {
        let config = config.validate()?;
        let registry = new_shared_registry();
        let backend = build_backend(&config.backend, registry.clone())?;

        Self::with_backend(config, registry, backend).await
    }

    /// Use a custom backend. `backend` must report sizes into `registry`.
    pub async fn with_backend(
        config: ResolverConfig,
        registry: SharedRegistry,
        backend: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        let config = config.validate()?;

        let restored = backend.restore().await?;
        ACTIVE_CHUNKS.add(restored as i64);

        let inner = Arc::new(ResolverInner {
            config,
            registry,
            backend,
            resolve_queue: Mutex::new(Queue::new()),
            handlers: ArcSwap::from_pointee(Vec::new()),
            caching_enabled: AtomicBool::new(true),
            handler_missing: AtomicBool::new(false),
            stop: CancellationToken::new(),
            registry_changed: Notify::new(),
            queue_changed: Notify::new(),
            watching_registry: AtomicBool::new(false),
            watching_queue: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            runtime: Handle::current(),
        });

        if restored > 0 {
            info!("{} persisted chunks restored, start watching", restored);
            inner.ensure_watching();
        }

        if inner.config.handle_signals {
            inner.listen_for_shutdown_signal();
        }

        Ok(Self { inner })
    }

    /// Buffer `rows` for `table`.
    ///
    /// Rows are spread over as many chunks as needed so that no chunk ever holds
    /// more than `chunk_size` rows. Returns once every row has been saved by the
    /// backend.
    ///
    /// # Errors
    /// - [`CacheError::Forbidden`] after [`ChunkResolver::shutdown`]
    /// - [`CacheError::InvalidTable`] for empty or path-like table names
    /// - storage errors from the backend, unchanged
    #[autometrics(objective = API_SLO)]
    pub async fn cache(
        &self,
        table: &str,
        rows: Vec<Row>,
    ) -> Result<()> {
        self.inner.cache(table, rows).await
    }

    /// Register a synchronous handler, invoked once per resolved chunk.
    pub fn on_resolved<F>(
        &self,
        handler: F,
    ) -> HandlerKey
    where
        F: Fn(ResolvedChunk) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register_handler(SyncHandler(handler))
    }

    /// Register an asynchronous handler, invoked once per resolved chunk.
    pub fn on_resolved_async<F, Fut>(
        &self,
        handler: F,
    ) -> HandlerKey
    where
        F: Fn(ResolvedChunk) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        self.register_handler(AsyncHandler(handler))
    }

    pub fn register_handler<H>(
        &self,
        handler: H,
    ) -> HandlerKey
    where
        H: ResolveHandler,
    {
        self.inner.add_handler(Arc::new(handler))
    }

    /// Returns false when no handler is registered under `key`.
    pub fn remove_handler(
        &self,
        key: &HandlerKey,
    ) -> bool {
        let mut removed = false;
        self.inner.handlers.rcu(|current| {
            let next: HandlerList = current.iter().filter(|(k, _)| k != key).cloned().collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.load().len()
    }

    /// Mark every active chunk ready so it resolves on the next readiness pass.
    pub fn flush(&self) {
        let snapshot = self.inner.registry.lock().get_all();
        debug!("flush requested for {} chunks", snapshot.len());
        for entry in snapshot {
            entry.chunk.set_ready();
        }
        self.inner.ensure_watching();
    }

    /// Chunks still accepting or awaiting readiness
    pub fn pending_chunks(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Chunks waiting for hand-off
    pub fn queued_chunks(&self) -> usize {
        self.inner.resolve_queue.lock().size()
    }

    pub fn is_caching_enabled(&self) -> bool {
        self.inner.caching_enabled.load(Ordering::Acquire)
    }

    pub fn registry(&self) -> SharedRegistry {
        self.inner.registry.clone()
    }

    pub fn backend(&self) -> Arc<dyn StorageBackend> {
        self.inner.backend.clone()
    }

    /// Graceful termination without exiting the process: disables caching, signals
    /// both loops to stop and synchronously backs up buffered writes.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.shutdown()
    }

    /// Stop both loops and wait for them. Returns the first error a loop ended with,
    /// e.g. [`CacheError::NoHandler`].
    pub async fn stop(&self) -> Result<()> {
        self.inner.stop.cancel();

        let handles: Vec<_> = std::mem::take(&mut *self.inner.tasks.lock());
        let mut result = Ok(());
        for handle in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Error::TaskFailed(e)),
            };
            if let Err(e) = outcome {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

impl Drop for ChunkResolver {
    fn drop(&mut self) {
        self.inner.stop.cancel();
        trace!("ChunkResolver dropped");
    }
}

impl std::fmt::Debug for ChunkResolver {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ChunkResolver")
            .field("config", &self.inner.config)
            .field("pending_chunks", &self.pending_chunks())
            .field("queued_chunks", &self.queued_chunks())
            .finish()
    }
}

impl ResolverInner {
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn cache(
        self: &Arc<Self>,
        table: &str,
        mut rows: Vec<Row>,
    ) -> Result<()> {
        if !self.caching_enabled.load(Ordering::Acquire) {
            return Err(CacheError::Forbidden.into());
        }
        id::validate_table(table)?;

        let total = rows.len();
        while !rows.is_empty() {
            let (chunk, admitted, _admission) = self.admit(table, rows.len());

            let rest = rows.split_off(admitted);
            let batch = std::mem::replace(&mut rows, rest);

            if let Err(e) = self.backend.save(&chunk, batch).await {
                error!(chunk_id = chunk.id(), "save failed: {:?}", e);
                chunk.release(admitted);
                return Err(e);
            }
        }

        ROWS_CACHED.with_label_values(&[table]).inc_by(total as u64);
        self.ensure_watching();
        Ok(())
    }

    /// Pick the unblocked chunk of `table` (or create one) and admit up to `wanted`
    /// rows into it.
    ///
    /// Runs under the registry lock, and the returned guard keeps the chunk
    /// inconsistent until the caller's save completes, so the readiness loop can
    /// not queue the chunk in between.
    fn admit(
        &self,
        table: &str,
        wanted: usize,
    ) -> (Arc<Chunk>, usize, WriteGuard) {
        let limit = self.config.chunk_size;
        let mut registry = self.registry.lock();

        loop {
            let chunk = match registry.current_for_table(table) {
                Some(chunk) if chunk.is_unblocked() => chunk,
                _ => {
                    let chunk = Arc::new(Chunk::scratch(table, self.config.chunk_life_ms));
                    debug!(chunk_id = chunk.id(), table, "created chunk");
                    registry.register(chunk.clone());
                    ACTIVE_CHUNKS.inc();
                    chunk
                }
            };

            let admitted = chunk.reserve(wanted, limit);
            if admitted == 0 {
                trace!(chunk_id = chunk.id(), "no capacity left, blocking chunk");
                chunk.block();
                continue;
            }

            let admission = chunk.enter_write();
            return (chunk, admitted, admission);
        }
    }

    fn add_handler(
        self: &Arc<Self>,
        handler: Arc<dyn ResolveHandler>,
    ) -> HandlerKey {
        let key = HandlerKey(id::handler_key());
        self.handlers.rcu(|current| {
            let mut next: HandlerList = current.iter().cloned().collect();
            next.push((key.clone(), handler.clone()));
            next
        });
        debug!(handler = %key, "resolve handler registered");

        if self.handler_missing.swap(false, Ordering::SeqCst) {
            info!("handler registered, resuming chunk hand-off");
        }
        self.ensure_watching_queue();
        key
    }

    fn ensure_watching(self: &Arc<Self>) {
        if self.stop.is_cancelled() {
            return;
        }

        if !self.watching_registry.swap(true, Ordering::SeqCst) {
            let this = self.clone();
            self.spawn_loop("registry watcher", this.watch_registry());
        }
        self.registry_changed.notify_one();

        self.ensure_watching_queue();
    }

    fn ensure_watching_queue(self: &Arc<Self>) {
        if self.stop.is_cancelled() || self.handler_missing.load(Ordering::SeqCst) {
            return;
        }

        if !self.watching_queue.swap(true, Ordering::SeqCst) {
            let this = self.clone();
            self.spawn_loop("resolve queue watcher", this.watch_resolve_queue());
        }
        self.queue_changed.notify_one();
    }

    fn spawn_loop<F>(
        &self,
        name: &'static str,
        task: F,
    ) where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = self.runtime.spawn(async move {
            let result = task.await;
            if let Err(e) = &result {
                error!("{} stopped with error: {:?}", name, e);
            }
            result
        });
        self.tasks.lock().push(handle);
    }

    /// Readiness loop. Paces itself with `check_interval_ms` between two chunk
    /// examinations and idles while the registry is empty.
    async fn watch_registry(self: Arc<Self>) -> Result<()> {
        debug!("registry watcher started");
        let pause = Duration::from_millis(self.config.check_interval_ms);

        loop {
            if self.stop.is_cancelled() {
                break;
            }

            let snapshot = self.registry.lock().get_all();
            if snapshot.is_empty() {
                tokio::select! {
                    _ = self.stop.cancelled() => break,
                    _ = self.registry_changed.notified() => {}
                }
                continue;
            }

            for entry in snapshot {
                self.examine(&entry.chunk).await;

                tokio::select! {
                    _ = self.stop.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        self.watching_registry.store(false, Ordering::SeqCst);
        debug!("registry watcher stopped");
        Ok(())
    }

    /// Block the chunk if it is ready; queue it once it is also consistent.
    async fn examine(
        self: &Arc<Self>,
        chunk: &Arc<Chunk>,
    ) {
        let row_count = self.backend.count_rows(chunk.id());
        if !chunk.is_ready(row_count, self.config.chunk_size, get_now_as_millis()) {
            return;
        }

        let released = {
            let mut registry = self.registry.lock();
            if registry.get_one(chunk.id()).is_none() {
                return;
            }

            if chunk.is_unblocked() {
                chunk.block();
                debug!(chunk_id = chunk.id(), row_count, "chunk blocked");
            }

            if chunk.is_consistent() {
                registry.unregister(chunk.id());
                true
            } else {
                trace!(chunk_id = chunk.id(), "append in flight, deferring");
                false
            }
        };

        if !released {
            return;
        }
        ACTIVE_CHUNKS.dec();

        if chunk.size() == 0 {
            // Every save into it failed; there is nothing to deliver
            debug!(chunk_id = chunk.id(), "dropping empty chunk");
            chunk.transition(ChunkStage::Active, ChunkStage::Done);
            if let Err(e) = self.backend.cleanup(chunk.id()).await {
                trace!("cleanup of empty chunk failed: {:?}", e);
            }
            return;
        }

        chunk.transition(ChunkStage::Active, ChunkStage::Queued);
        self.resolve_queue.lock().enqueue(chunk.clone());
        debug!(chunk_id = chunk.id(), size = chunk.size(), "chunk queued for resolve");

        self.ensure_watching_queue();
    }

    /// Hand-off loop. Delivers queued chunks one at a time.
    async fn watch_resolve_queue(self: Arc<Self>) -> Result<()> {
        debug!("resolve queue watcher started");
        let pause = Duration::from_millis(self.config.check_interval_ms);

        loop {
            if self.stop.is_cancelled() {
                break;
            }

            let head = self.resolve_queue.lock().peek().map(|c| c.id().to_string());
            let head_id = match head {
                Some(head_id) => head_id,
                None => {
                    tokio::select! {
                        _ = self.stop.cancelled() => break,
                        _ = self.queue_changed.notified() => {}
                    }
                    continue;
                }
            };

            let handlers = self.handlers.load_full();
            if handlers.is_empty() {
                // Leave the chunk queued: without a handler its rows would be lost
                error!(chunk_id = %head_id, "no resolve handler registered");
                return Err(self.give_up_without_handler(head_id));
            }

            let next = self.resolve_queue.lock().dequeue();
            let Some(chunk) = next else {
                continue;
            };

            if !chunk.is_consistent() {
                trace!(chunk_id = chunk.id(), "queued chunk still inconsistent, requeue");
                self.resolve_queue.lock().enqueue(chunk);
                tokio::select! {
                    _ = self.stop.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
                continue;
            }

            self.resolve(chunk, &handlers).await;
        }

        self.watching_queue.store(false, Ordering::SeqCst);
        debug!("resolve queue watcher stopped");
        Ok(())
    }

    fn give_up_without_handler(
        self: &Arc<Self>,
        chunk_id: String,
    ) -> Error {
        self.handler_missing.store(true, Ordering::SeqCst);
        self.watching_queue.store(false, Ordering::SeqCst);

        // A handler may have been registered while we were giving up
        if !self.handlers.load().is_empty() && self.handler_missing.swap(false, Ordering::SeqCst) {
            self.ensure_watching_queue();
        }

        CacheError::NoHandler { chunk_id }.into()
    }

    /// Invoke every handler, isolating failures, then clean the chunk up.
    async fn resolve(
        &self,
        chunk: Arc<Chunk>,
        handlers: &HandlerList,
    ) {
        if !chunk.transition(ChunkStage::Queued, ChunkStage::Resolving) {
            warn!(chunk_id = chunk.id(), stage = ?chunk.stage(), "chunk already resolved, skipping");
            return;
        }

        let started = Instant::now();
        let view = ResolvedChunk::new(&chunk, self.backend.clone());

        let outcomes = join_all(handlers.iter().map(|(key, handler)| {
            let key = key.clone();
            let handler = handler.clone();
            let view = view.clone();
            async move {
                let outcome = AssertUnwindSafe(async move { handler.handle(view).await })
                    .catch_unwind()
                    .await;
                (key, outcome)
            }
        }))
        .await;

        for (key, outcome) in outcomes {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(handler = %key, chunk_id = chunk.id(), "resolve handler failed: {}", e);
                    HANDLER_FAILURES.with_label_values(&[chunk.table()]).inc();
                }
                Err(_) => {
                    error!(handler = %key, chunk_id = chunk.id(), "resolve handler panicked");
                    HANDLER_FAILURES.with_label_values(&[chunk.table()]).inc();
                }
            }
        }

        if let Err(e) = self.backend.cleanup(chunk.id()).await {
            error!(chunk_id = chunk.id(), "cleanup after resolve failed: {:?}", e);
            CLEANUP_FAILURES.inc();
        }
        chunk.transition(ChunkStage::Resolving, ChunkStage::Done);

        CHUNKS_RESOLVED.with_label_values(&[chunk.table()]).inc();
        RESOLVE_DURATION_MS
            .with_label_values(&[chunk.table()])
            .observe(started.elapsed().as_millis() as f64);
        info!(
            chunk_id = chunk.id(),
            table = chunk.table(),
            size = chunk.size(),
            "chunk resolved"
        );
    }

    fn shutdown(&self) -> Result<()> {
        info!("shutdown requested, disabling cache and backing up buffered writes");
        self.caching_enabled.store(false, Ordering::SeqCst);
        self.stop.cancel();
        self.backend.backup()
    }

    fn listen_for_shutdown_signal(self: &Arc<Self>) {
        let this = self.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = this.stop.cancelled() => {}
                signal = wait_for_termination() => match signal {
                    Ok(name) => {
                        info!("Initialize chunks backup due to received {} signal", name);
                        if let Err(e) = this.shutdown() {
                            error!("Backup on shutdown failed: {:?}", e);
                        }
                        std::process::exit(0);
                    }
                    Err(e) => {
                        error!("Failed to install termination signal handler: {:?}", e);
                    }
                }
            }
        });
    }
}

async fn wait_for_termination() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::signal;
        use tokio::signal::unix::SignalKind;

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => Ok("SIGINT"),
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("Ctrl+C")
    }
}
