use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::info;
use xxhash_rust::xxh3::xxh3_64;

use crate::record::ChangeKey;
use crate::Result;

/// Shard owning `key` among `shard_count` workers.
///
/// Depends only on the key bytes, so every notification for a key lands on
/// the same worker for the lifetime of the pool.
#[inline]
pub fn shard_index(
    key: &str,
    shard_count: usize,
) -> usize {
    debug_assert!(shard_count > 0);
    (xxh3_64(key.as_bytes()) % shard_count as u64) as usize
}

/// Routes keys from the ingest queue to the shard queues
#[derive(Debug)]
pub struct Dispatcher {
    ingest_rx: mpsc::Receiver<ChangeKey>,
    shards: Vec<mpsc::Sender<ChangeKey>>,
}

impl Dispatcher {
    pub fn new(
        ingest_rx: mpsc::Receiver<ChangeKey>,
        shards: Vec<mpsc::Sender<ChangeKey>>,
    ) -> Self {
        Self { ingest_rx, shards }
    }

    /// Drains the ingest queue until it is closed.
    ///
    /// Returning drops every shard sender, which lets the workers drain and exit.
    pub async fn run(mut self) -> Result<()> {
        let shard_count = self.shards.len();
        while let Some(key) = self.ingest_rx.recv().await {
            let index = shard_index(&key, shard_count);
            debug!(%key, shard = index, "dispatch");
            if let Err(e) = self.shards[index].send(key).await {
                error!(shard = index, key = %e.0, "shard queue closed, key dropped");
            }
        }

        info!("ingest queue closed, closing {} shard queues", shard_count);
        Ok(())
    }
}
