use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use crate::ResolvedChunk;
use crate::ResolverConfig;
use crate::Row;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    env_logger::init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

pub fn row(i: usize) -> Row {
    match json!({ "id": i, "name": format!("row-{i}") }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// `n` rows numbered from `start`
pub fn rows_from(
    start: usize,
    n: usize,
) -> Vec<Row> {
    (start..start + n).map(row).collect()
}

pub fn rows(n: usize) -> Vec<Row> {
    rows_from(0, n)
}

/// Memory config with signal handling disabled
pub fn memory_config(
    chunk_size: usize,
    chunk_life_ms: u64,
    check_interval_ms: u64,
) -> ResolverConfig {
    ResolverConfig::memory(chunk_size, chunk_life_ms, check_interval_ms)
}

/// One handler invocation, with the rows loaded inside the handler
#[derive(Debug, Clone)]
pub struct Delivery {
    pub chunk_id: String,
    pub table: String,
    pub size: usize,
    pub rows: Vec<Row>,
}

/// Records every chunk delivered to the handler it produces.
#[derive(Debug, Clone, Default)]
pub struct Deliveries {
    inner: Arc<Mutex<Vec<Delivery>>>,
}

impl Deliveries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Async handler that loads the rows and records the delivery
    pub fn handler(
        &self
    ) -> impl Fn(ResolvedChunk) -> futures::future::BoxFuture<'static, Result<(), crate::HandlerError>>
           + Send
           + Sync
           + 'static {
        use futures::FutureExt;

        let inner = self.inner.clone();
        move |chunk: ResolvedChunk| {
            let inner = inner.clone();
            async move {
                let rows = chunk.load_rows().await?;
                inner.lock().push(Delivery {
                    chunk_id: chunk.id().to_string(),
                    table: chunk.table().to_string(),
                    size: chunk.size(),
                    rows,
                });
                Ok::<(), crate::HandlerError>(())
            }
            .boxed()
        }
    }

    pub fn all(&self) -> Vec<Delivery> {
        self.inner.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn total_rows(&self) -> usize {
        self.inner.lock().iter().map(|d| d.rows.len()).sum()
    }

    pub fn for_table(
        &self,
        table: &str,
    ) -> Vec<Delivery> {
        self.inner.lock().iter().filter(|d| d.table == table).cloned().collect()
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until<F>(
    timeout: Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
