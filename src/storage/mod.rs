mod mem_store;
mod sled_store;

pub use mem_store::*;
pub use sled_store::*;


use std::path::Path;

#[cfg(test)]
use mockall::automock;
use tracing::debug;
use tracing::warn;

use crate::record::WriteBatch;
use crate::Result;
use crate::StorageConfig;
use crate::StorageError;

/// Embedded ordered key-value store holding the replica
///
/// Shared by every persistence worker (writes) and the query agent (reads).
#[cfg_attr(test, automock)]
pub trait LocalStore: Send + Sync + 'static {
    /// Applies every pair or none of them
    fn batch_write(
        &self,
        batch: WriteBatch,
    ) -> Result<()>;

    fn get(
        &self,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>>;

    fn flush(&self) -> Result<()>;
}

/// Opens the sled database configured for the replica
pub fn init_sled_db(config: &StorageConfig) -> Result<sled::Db> {
    debug!("init_sled_db from path: {:?}", &config.db_path);
    open_sled_db(&config.db_path, config)
}

fn open_sled_db(
    path: &Path,
    config: &StorageConfig,
) -> Result<sled::Db> {
    let flush_every_ms = match config.flush_every_ms {
        0 => None,
        ms => Some(ms),
    };

    sled::Config::default()
        .path(path)
        .cache_capacity(config.cache_capacity_bytes)
        .flush_every_ms(flush_every_ms)
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!("Try to open DB at this location: {:?} and failed: {:?}", path, e);
            StorageError::DbError(e.to_string()).into()
        })
}
