//! Persistence worker.
//!
//! One per shard. Re-reads the full hash of every key it receives and writes
//! the record together with its index entry in one local batch.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::PipelineStats;
use super::ShardStats;
use crate::constants::HASH_TYPE;
use crate::record::ChangeKey;
use crate::record::SourceRecord;
use crate::record::WriteBatch;
use crate::storage::LocalStore;
use crate::upstream::UpstreamClient;
use crate::utils::Backoff;
use crate::utils::BackoffWait;
use crate::Result;
use crate::RetryPolicies;
use crate::SystemError;

/// How a single key ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Record and index entry written
    Persisted,
    /// Wrong shape or vanished key
    Skipped,
    /// Local write kept failing; the key waits for its next notification
    WriteFailed,
}

pub struct Storer<C, S>
where
    C: UpstreamClient,
    S: LocalStore,
{
    id: usize,
    client: C,
    store: Arc<S>,
    retry: RetryPolicies,
    apply_ttl: bool,
    stats: Arc<PipelineStats>,
}

impl<C, S> fmt::Debug for Storer<C, S>
where
    C: UpstreamClient,
    S: LocalStore,
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Storer")
            .field("id", &self.id)
            .field("apply_ttl", &self.apply_ttl)
            .finish()
    }
}

impl<C, S> Storer<C, S>
where
    C: UpstreamClient,
    S: LocalStore,
{
    pub fn new(
        id: usize,
        client: C,
        store: Arc<S>,
        retry: RetryPolicies,
        apply_ttl: bool,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            id,
            client,
            store,
            retry,
            apply_ttl,
            stats,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Opens the worker's upstream connection; failure aborts startup
    pub async fn start(&mut self) -> Result<()> {
        self.client.connect().await.map_err(|e| {
            error!(storer = self.id, "storer start failed: {:?}", e);
            SystemError::StartFailed(format!("storer {}: {e}", self.id)).into()
        })
    }

    /// Consumes the shard queue until it is closed and drained
    pub async fn run(
        mut self,
        mut queue: mpsc::Receiver<ChangeKey>,
    ) -> Result<()> {
        info!(storer = self.id, "storer running");
        while let Some(key) = queue.recv().await {
            self.process_key(&key).await;
        }

        self.client.close().await;
        info!(storer = self.id, "shard queue closed, storer exited");
        Ok(())
    }

    /// Fetches, serializes and persists one key.
    ///
    /// Upstream errors never drop the key: the worker reconnects and fetches
    /// it again.
    pub async fn process_key(
        &mut self,
        key: &str,
    ) -> ProcessOutcome {
        let record = loop {
            match self.fetch(key).await {
                Ok(Some(record)) => break record,
                Ok(None) => return self.skipped(),
                // server replies (LOADING, BUSY, ...) are retried like transport faults;
                // the next pass re-checks TYPE
                Err(e) => {
                    if e.is_upstream_transport() {
                        warn!(storer = self.id, %key, "upstream read failed: {:?}", e);
                    } else {
                        warn!(storer = self.id, %key, "upstream rejected read: {:?}", e);
                    }
                    self.shard_stats(|s| s.inc_retried());
                    if !self.recover().await {
                        error!(storer = self.id, %key, "reconnect attempts exhausted, key skipped");
                        return self.skipped();
                    }
                }
            }
        };

        let batch = match record.write_batch(key) {
            Ok(batch) => batch,
            Err(e) => {
                error!(storer = self.id, %key, "serialize failed, key skipped: {:?}", e);
                return self.skipped();
            }
        };

        if !self.write(key, batch).await {
            self.shard_stats(|s| s.inc_write_failed());
            return ProcessOutcome::WriteFailed;
        }

        if self.apply_ttl {
            self.apply_expire(key, &record).await;
        }

        debug!(storer = self.id, %key, version = record.version(), "persisted");
        self.shard_stats(|s| s.inc_processed());
        ProcessOutcome::Persisted
    }

    /// `None` when the key does not hold a hash (or vanished before the read)
    async fn fetch(
        &mut self,
        key: &str,
    ) -> Result<Option<SourceRecord>> {
        let kind = self.client.type_of(key).await?;
        if kind != HASH_TYPE {
            error!(storer = self.id, %key, %kind, "unexpected value type, key skipped");
            return Ok(None);
        }

        let fields = self.client.read_hash_fields(key).await?;
        if fields.is_empty() {
            warn!(storer = self.id, %key, "hash vanished before read, key skipped");
            return Ok(None);
        }
        Ok(Some(SourceRecord::new(fields)))
    }

    /// Reconnects with the storer backoff; false only for a bounded policy
    async fn recover(&mut self) -> bool {
        let mut backoff = Backoff::new("storer", self.retry.storer);
        loop {
            if let BackoffWait::Exhausted = backoff.wait(None).await {
                return false;
            }
            match self.client.reconnect().await {
                Ok(()) => {
                    info!(storer = self.id, attempts = backoff.attempt(), "storer reconnected");
                    return true;
                }
                Err(e) => warn!(storer = self.id, "storer reconnect failed: {:?}", e),
            }
        }
    }

    /// Applies the batch, retrying local faults with the bounded policy
    async fn write(
        &mut self,
        key: &str,
        batch: WriteBatch,
    ) -> bool {
        let mut backoff = Backoff::new("local_store", self.retry.local_store);
        loop {
            match self.store.batch_write(batch.clone()) {
                Ok(()) => return true,
                Err(e) => {
                    warn!(storer = self.id, %key, "local write failed: {:?}", e);
                    match backoff.wait(None).await {
                        BackoffWait::Ready { .. } => {}
                        BackoffWait::Stopped | BackoffWait::Exhausted => {
                            error!(
                                storer = self.id,
                                %key,
                                attempts = backoff.attempt() + 1,
                                "local write failed, key dropped"
                            );
                            return false;
                        }
                    }
                }
            }
        }
    }

    async fn apply_expire(
        &mut self,
        key: &str,
        record: &SourceRecord,
    ) {
        let Some(seconds) = record.expire_seconds() else {
            return;
        };
        let args = vec![key.to_string(), seconds.to_string()];
        if let Err(e) = self.client.execute("EXPIRE", &args).await {
            warn!(storer = self.id, %key, seconds, "expire failed: {:?}", e);
        }
    }

    fn skipped(&self) -> ProcessOutcome {
        self.shard_stats(|s| s.inc_skipped());
        ProcessOutcome::Skipped
    }

    fn shard_stats(
        &self,
        f: impl FnOnce(&ShardStats),
    ) {
        if let Some(s) = self.stats.shard(self.id) {
            f(s);
        }
    }
}
