//! Pluggable chunk storage.
//!
//! A backend persists rows under a chunk id and reports durable sizes back to the
//! shared registry. The concrete backend is chosen once, from configuration.

mod adaptors;
mod storage_backend;
mod write_gate;

pub use adaptors::*;
pub use storage_backend::*;
pub use write_gate::*;


use std::sync::Arc;

use config::ConfigError;
use tracing::debug;

use crate::BackendConfig;
use crate::BackendKind;
use crate::Error;
use crate::Result;
use crate::SharedRegistry;

/// Build the backend selected by `config`, wired to `registry`.
pub fn build_backend(
    config: &BackendConfig,
    registry: SharedRegistry,
) -> Result<Arc<dyn StorageBackend>> {
    debug!(kind = ?config.kind, "build storage backend");

    match config.kind {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new(registry))),
        BackendKind::Disk => {
            let disk = config.disk.as_ref().ok_or_else(|| {
                Error::Config(ConfigError::Message(
                    "backend.disk.output_directory is required for the disk backend".into(),
                ))
            })?;
            Ok(Arc::new(DiskBackend::new(disk.output_directory.clone(), registry)))
        }
    }
}
