//! # chunk-resolver
//!
//! A row-batching write buffer. Producers hand rows to [`ChunkResolver::cache`];
//! rows accumulate per table into chunks bounded by row count and age, and each
//! complete chunk is handed to every registered consumer exactly once.
//!
//! ```ignore
//! let resolver = ChunkResolver::new(ResolverConfig::memory(500, 5_000, 1_000)).await?;
//! resolver.on_resolved(|chunk| {
//!     println!("{} rows ready for {}", chunk.size(), chunk.table());
//!     Ok(())
//! });
//! resolver.cache("events", rows).await?;
//! ```
//!
//! Two storage backends ship with the crate: an in-process one and a disk one that
//! survives restarts. See [`StorageBackend`] to plug in another.

mod chunk;
mod config;
mod errors;
mod metrics;
mod queue;
mod registry;
mod resolver;
mod storage;
pub mod utils;

pub use chunk::*;
pub use crate::config::*;
pub use errors::*;
pub use metrics::*;
pub use queue::*;
pub use registry::*;
pub use resolver::*;
pub use storage::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
