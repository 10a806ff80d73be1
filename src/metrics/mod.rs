use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;


lazy_static! {
    pub static ref ROWS_CACHED: IntCounterVec = IntCounterVec::new(
        Opts::new("rows_cached", "Rows admitted through cache()"),
        &["table"]
    )
    .expect("metric can not be created");

    pub static ref CHUNKS_RESOLVED: IntCounterVec = IntCounterVec::new(
        Opts::new("chunks_resolved", "Chunks delivered to handlers and cleaned up"),
        &["table"]
    )
    .expect("metric can not be created");

    pub static ref HANDLER_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("handler_failures", "Resolve handler errors and panics"),
        &["table"]
    )
    .expect("metric can not be created");

    pub static ref CLEANUP_FAILURES: IntCounter =
        IntCounter::new("cleanup_failures", "Failed backend cleanups after resolve")
            .expect("metric can not be created");

    pub static ref ACTIVE_CHUNKS: IntGauge =
        IntGauge::new("active_chunks", "Chunks registered and not yet queued")
            .expect("metric can not be created");

    pub static ref RESOLVE_DURATION_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("resolve_duration_ms", "Time spent delivering a chunk in ms")
            .buckets(exponential_buckets(1.0, 2.0, 16).expect("valid buckets")),
        &["table"]
    )
    .expect("metric can not be created");
}

/// Attach the resolver collectors to an embedder-owned registry.
pub fn register_custom_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(ROWS_CACHED.clone()))?;
    registry.register(Box::new(CHUNKS_RESOLVED.clone()))?;
    registry.register(Box::new(HANDLER_FAILURES.clone()))?;
    registry.register(Box::new(CLEANUP_FAILURES.clone()))?;
    registry.register(Box::new(ACTIVE_CHUNKS.clone()))?;
    registry.register(Box::new(RESOLVE_DURATION_MS.clone()))?;
    Ok(())
}
