use std::sync::Arc;
use std::time::Duration;

use chunk_resolver::ChunkResolver;
use chunk_resolver::HandlerError;
use chunk_resolver::HandlerKey;
use chunk_resolver::Row;
use parking_lot::Mutex;
use serde_json::json;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn rows(
    start: usize,
    n: usize,
) -> Vec<Row> {
    (start..start + n)
        .map(|i| match json!({ "id": i, "payload": format!("value-{i}") }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        })
        .collect()
}

/// (table, rows) per delivered chunk
#[derive(Clone, Default)]
pub struct Collected {
    inner: Arc<Mutex<Vec<(String, Vec<Row>)>>>,
}

impl Collected {
    pub fn attach(
        &self,
        resolver: &ChunkResolver,
    ) -> HandlerKey {
        let inner = self.inner.clone();
        resolver.on_resolved_async(move |chunk| {
            let inner = inner.clone();
            async move {
                let rows = chunk.load_rows().await?;
                assert_eq!(rows.len(), chunk.size());
                inner.lock().push((chunk.table().to_string(), rows));
                Ok::<(), HandlerError>(())
            }
        })
    }

    pub fn chunks(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn rows_for(
        &self,
        table: &str,
    ) -> Vec<Row> {
        self.inner
            .lock()
            .iter()
            .filter(|(t, _)| t == table)
            .flat_map(|(_, rows)| rows.clone())
            .collect()
    }

    pub fn total_rows(&self) -> usize {
        self.inner.lock().iter().map(|(_, rows)| rows.len()).sum()
    }
}

pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
