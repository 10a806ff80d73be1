//! Configuration management for the chunk resolver.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
mod backend;
pub use backend::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

pub(crate) const CONFIG_PATH_ENV: &str = "CHUNK_RESOLVER_CONFIG_PATH";
pub(crate) const ENV_PREFIX: &str = "CHUNK_RESOLVER";

/// Resolver construction parameters
///
/// Sources are merged with later ones winning:
/// 1. Default values from code
/// 2. Configuration file named by `CHUNK_RESOLVER_CONFIG_PATH`
/// 3. Environment variables with the `CHUNK_RESOLVER__` prefix
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResolverConfig {
    /// Row count at which a chunk becomes ready
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Minimum lifetime of a chunk before it becomes ready by time
    #[serde(default = "default_chunk_life_ms")]
    pub chunk_life_ms: u64,

    /// Pause between two chunk examinations of the readiness loop
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    #[serde(default)]
    pub backend: BackendConfig,

    /// Install SIGTERM/SIGINT handlers that back up buffered writes and exit
    #[serde(default = "default_handle_signals")]
    pub handle_signals: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_life_ms: default_chunk_life_ms(),
            check_interval_ms: default_check_interval_ms(),
            backend: BackendConfig::default(),
            handle_signals: default_handle_signals(),
        }
    }
}

impl ResolverConfig {
    /// Loads configuration from defaults, the optional config file and the
    /// environment. Does not validate; call [`ResolverConfig::validate`].
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CHUNK_RESOLVER__CHUNK_SIZE", "1000");
    /// let cfg = ResolverConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies overrides from `path`, then the environment again.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// In-memory backend with the given limits; signal handling disabled.
    pub fn memory(
        chunk_size: usize,
        chunk_life_ms: u64,
        check_interval_ms: u64,
    ) -> Self {
        Self {
            chunk_size,
            chunk_life_ms,
            check_interval_ms,
            backend: BackendConfig::memory(),
            handle_signals: false,
        }
    }

    /// Disk backend writing into `output_directory`; signal handling disabled.
    pub fn disk(
        chunk_size: usize,
        chunk_life_ms: u64,
        check_interval_ms: u64,
        output_directory: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            chunk_size,
            chunk_life_ms,
            check_interval_ms,
            backend: BackendConfig::disk(output_directory),
            handle_signals: false,
        }
    }

    /// Validates configuration and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        if self.chunk_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "chunk_size must be greater than 0".into(),
            )));
        }

        if self.check_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "check_interval_ms must be at least 1ms".into(),
            )));
        }

        self.backend.validate()?;
        Ok(self)
    }
}

fn default_chunk_size() -> usize {
    500
}
// in ms
fn default_chunk_life_ms() -> u64 {
    5000
}
// in ms
fn default_check_interval_ms() -> u64 {
    1000
}
fn default_handle_signals() -> bool {
    true
}
