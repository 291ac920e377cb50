use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory of the sled database
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Page cache size handed to sled
    #[serde(default = "default_cache_capacity_bytes")]
    pub cache_capacity_bytes: u64,

    /// Background flush interval of sled; 0 disables periodic flushing
    #[serde(default = "default_flush_every_ms")]
    pub flush_every_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_capacity_bytes: default_cache_capacity_bytes(),
            flush_every_ms: default_flush_every_ms(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(invalid("storage.db_path cannot be empty"));
        }
        if self.cache_capacity_bytes == 0 {
            return Err(invalid("storage.cache_capacity_bytes must be greater than 0"));
        }
        Ok(())
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./db/replica")
}
fn default_cache_capacity_bytes() -> u64 {
    64 * 1024 * 1024
}
fn default_flush_every_ms() -> u64 {
    500
}
