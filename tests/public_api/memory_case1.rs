use chunk_resolver::register_custom_metrics;
use chunk_resolver::CacheError;
use chunk_resolver::ChunkResolver;
use chunk_resolver::Error;
use chunk_resolver::ResolverConfig;

use crate::common::rows;
use crate::common::wait_until;
use crate::common::Collected;
use crate::enable_logger;

/// # Case 1: producers on two tables
///
/// ## Criterias:
/// 1. every cached row is delivered, per table, in admission order
/// 2. no delivered chunk exceeds the size limit
#[tokio::test]
async fn test_rows_are_delivered_per_table() {
    enable_logger();
    let resolver = ChunkResolver::new(ResolverConfig::memory(25, 200, 5))
        .await
        .expect("should succeed");
    let collected = Collected::default();
    collected.attach(&resolver);

    resolver.cache("orders", rows(0, 60)).await.expect("should succeed");
    resolver.cache("users", rows(0, 10)).await.expect("should succeed");
    resolver.cache("orders", rows(60, 15)).await.expect("should succeed");

    assert!(wait_until(|| collected.total_rows() == 85).await);
    assert_eq!(collected.rows_for("orders"), rows(0, 75));
    assert_eq!(collected.rows_for("users"), rows(0, 10));
    assert_eq!(resolver.pending_chunks(), 0);

    resolver.stop().await.expect("should succeed");
}

#[tokio::test]
async fn test_shutdown_forbids_cache() {
    enable_logger();
    let resolver = ChunkResolver::new(ResolverConfig::memory(10, 1000, 5))
        .await
        .expect("should succeed");

    resolver.shutdown().expect("should succeed");
    let result = resolver.cache("orders", rows(0, 1)).await;
    assert!(matches!(result, Err(Error::Cache(CacheError::Forbidden))));
}

#[test]
fn test_metrics_register_once() {
    let registry = prometheus::Registry::new();
    register_custom_metrics(&registry).expect("should succeed");
    assert!(register_custom_metrics(&registry).is_err());
}
