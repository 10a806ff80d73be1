use std::time::Duration;

use chunk_resolver::ChunkResolver;
use chunk_resolver::ResolverConfig;

use crate::common::rows;
use crate::common::wait_until;
use crate::common::Collected;
use crate::enable_logger;

fn chunk_files(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("txt"))
                .count()
        })
        .unwrap_or(0)
}

/// # Case 1: restart before resolution
///
/// ## Setup:
/// 1. cache rows with a long chunk life and stop the resolver
/// 2. start a new resolver against the same directory
///
/// ## Criterias:
/// 1. the new resolver delivers the same rows
/// 2. chunk files are deleted once delivered
#[tokio::test]
async fn test_restart_delivers_persisted_rows() {
    enable_logger();
    let dir = tempfile::tempdir().expect("should succeed");
    let config = ResolverConfig::disk(100, 60_000, 5, dir.path());

    {
        let resolver = ChunkResolver::new(config.clone()).await.expect("should succeed");
        resolver.cache("events", rows(0, 30)).await.expect("should succeed");
        resolver.cache("audit", rows(0, 4)).await.expect("should succeed");
        resolver.stop().await.expect("should succeed");
    }
    assert_eq!(chunk_files(dir.path()), 2);

    let resolver = ChunkResolver::new(config).await.expect("should succeed");
    assert_eq!(resolver.pending_chunks(), 2);

    let collected = Collected::default();
    collected.attach(&resolver);
    resolver.flush();

    assert!(wait_until(|| collected.chunks() == 2).await);
    assert_eq!(collected.rows_for("events"), rows(0, 30));
    assert_eq!(collected.rows_for("audit"), rows(0, 4));
    assert!(wait_until(|| chunk_files(dir.path()) == 0).await);

    resolver.stop().await.expect("should succeed");
}

/// # Case 2: chunks expire while the process is down
///
/// ## Criterias:
/// 1. restored chunks resolve on their own once a handler is registered
#[tokio::test]
async fn test_restart_resolves_expired_chunks() {
    enable_logger();
    let dir = tempfile::tempdir().expect("should succeed");
    let config = ResolverConfig::disk(100, 100, 5, dir.path());

    {
        let resolver = ChunkResolver::new(config.clone()).await.expect("should succeed");
        resolver.cache("events", rows(0, 7)).await.expect("should succeed");
        resolver.shutdown().expect("should succeed");
    }
    tokio::time::sleep(Duration::from_millis(150)).await;

    let resolver = ChunkResolver::new(config).await.expect("should succeed");
    let collected = Collected::default();
    collected.attach(&resolver);

    assert!(wait_until(|| collected.total_rows() == 7).await);
    assert_eq!(collected.rows_for("events"), rows(0, 7));

    // Restored chunks keep accepting rows for a new chunk as usual
    resolver.cache("events", rows(7, 3)).await.expect("should succeed");
    assert!(wait_until(|| collected.total_rows() == 10).await);

    let _ = resolver.stop().await;
}
