//! Configuration management module for the replication pipeline.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
//!
//! The resulting [`SyncerConfig`] is built once at startup and each component
//! receives the section it needs through its constructor.
mod log;
mod network;
mod pipeline;
mod retry;
mod storage;
mod upstream;
pub use log::*;
pub use network::*;
pub use pipeline::*;
pub use retry::*;
pub use storage::*;
pub use upstream::*;


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

/// Environment variable prefix, e.g. `SYNCER__UPSTREAM__HOST`
pub const ENV_PREFIX: &str = "SYNCER";

/// Main configuration container for the syncer components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct SyncerConfig {
    /// Source store connection and notification settings
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Local embedded store settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Queue sizing and shard count
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Reconnect and write retry policies
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Line-protocol command service
    #[serde(default)]
    pub admin: AdminConfig,
    /// Framed query agent
    #[serde(default)]
    pub agent: AgentConfig,
    /// Log file location
    #[serde(default)]
    pub log: LogConfig,
}

impl Debug for SyncerConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SyncerConfig")
            .field("upstream", &self.upstream)
            .field("storage", &self.storage)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl SyncerConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `SYNCER__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so that `with_override_config()` can still be applied.
    /// Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/syncer.toml");
    /// std::env::set_var("SYNCER__PIPELINE__SHARD_COUNT", "8");
    /// let cfg = SyncerConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// Consumes self and performs validation of all subsystems. Must be called
    /// after all configuration overrides are applied.
    pub fn validate(self) -> Result<Self> {
        self.upstream.validate()?;
        self.storage.validate()?;
        self.pipeline.validate()?;
        self.retry.validate()?;
        self.admin.validate()?;
        self.agent.validate()?;
        self.log.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

/// Shorthand for a validation failure.
pub(crate) fn invalid(msg: impl Into<String>) -> Error {
    Error::Config(ConfigError::Message(msg.into()))
}
