use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;

use super::Dispatcher;
use super::PipelineStats;
use super::Storer;
use crate::record::ChangeKey;
use crate::storage::LocalStore;
use crate::upstream::UpstreamClient;
use crate::utils::async_task::spawn_task;
use crate::Result;

/// Lifecycle owner of the dispatcher and the persistence workers
#[derive(Debug)]
pub struct StorerMgr<C, S>
where
    C: UpstreamClient,
    S: LocalStore,
{
    storers: Vec<Storer<C, S>>,
    shard_queue_capacity: usize,
    stats: Arc<PipelineStats>,
}

impl<C, S> StorerMgr<C, S>
where
    C: UpstreamClient,
    S: LocalStore,
{
    pub fn new(
        storers: Vec<Storer<C, S>>,
        shard_queue_capacity: usize,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            storers,
            shard_queue_capacity,
            stats,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.storers.len()
    }

    /// Connects every worker; the first failure aborts startup
    pub async fn connect(&mut self) -> Result<()> {
        for storer in self.storers.iter_mut() {
            storer.start().await?;
        }
        info!(shards = self.storers.len(), "storers connected");
        Ok(())
    }

    /// Runs the dispatcher and every worker until the ingest queue is closed
    /// and all shard queues are drained.
    pub async fn start(
        self,
        ingest_rx: mpsc::Receiver<ChangeKey>,
    ) -> Result<()> {
        let mut handles: Vec<(String, JoinHandle<()>)> = Vec::with_capacity(self.storers.len() + 1);
        let mut shard_txs = Vec::with_capacity(self.storers.len());

        for storer in self.storers {
            let (tx, rx) = mpsc::channel(self.shard_queue_capacity);
            shard_txs.push(tx);
            let name = format!("storer-{}", storer.id());
            spawn_task(&name, move || storer.run(rx), Some(&mut handles));
        }

        let dispatcher = Dispatcher::new(ingest_rx, shard_txs);
        spawn_task("dispatcher", move || dispatcher.run(), Some(&mut handles));

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                error!("task {name} panicked: {:?}", e);
            }
        }

        info!(stats = %self.stats.snapshot(), "storer pool drained");
        Ok(())
    }

    /// Spawns [`StorerMgr::start`]; awaiting the returned handle is the stop barrier
    pub fn spawn(
        self,
        ingest_rx: mpsc::Receiver<ChangeKey>,
    ) -> StorerMgrHandle {
        StorerMgrHandle {
            handle: tokio::spawn(self.start(ingest_rx)),
        }
    }
}

/// Running storer pool
#[derive(Debug)]
pub struct StorerMgrHandle {
    handle: JoinHandle<Result<()>>,
}

impl StorerMgrHandle {
    /// Waits until the pool has fully drained.
    ///
    /// The pool only drains after its ingest queue closes, so stop the
    /// listener first.
    pub async fn stop(self) -> Result<()> {
        self.handle.await?
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
