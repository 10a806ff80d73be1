use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Storage backend variant
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Rows live in process memory
    #[default]
    #[serde(alias = "process")]
    Memory,
    /// Rows are appended to one file per chunk
    Disk,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DiskConfig {
    /// Directory holding `<chunk id>.txt` files
    pub output_directory: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    #[serde(default)]
    pub disk: Option<DiskConfig>,
}

impl BackendConfig {
    pub fn memory() -> Self {
        Self {
            kind: BackendKind::Memory,
            disk: None,
        }
    }

    pub fn disk(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            kind: BackendKind::Disk,
            disk: Some(DiskConfig {
                output_directory: output_directory.into(),
            }),
        }
    }

    pub(super) fn validate(&self) -> Result<()> {
        if self.kind != BackendKind::Disk {
            return Ok(());
        }

        match &self.disk {
            Some(disk) if !disk.output_directory.as_os_str().is_empty() => Ok(()),
            _ => Err(Error::Config(ConfigError::Message(
                "backend.disk.output_directory is required for the disk backend".into(),
            ))),
        }
    }
}
