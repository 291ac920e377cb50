use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use parking_lot::RwLock;
use serde::Serialize;

use super::ListenerState;

/// Per-shard counters of one persistence worker
#[derive(Debug, Default)]
pub struct ShardStats {
    processed: AtomicU64,
    skipped: AtomicU64,
    retried: AtomicU64,
    write_failed: AtomicU64,
}

impl ShardStats {
    pub fn inc_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_write_failed(&self) {
        self.write_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ShardSnapshot {
        ShardSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            write_failed: self.write_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShardSnapshot {
    pub processed: u64,
    pub skipped: u64,
    pub retried: u64,
    pub write_failed: u64,
}

/// Health counters shared by the listener, the workers and the admin service
#[derive(Debug)]
pub struct PipelineStats {
    shards: Vec<ShardStats>,
    max_queue_depth: AtomicUsize,
    listener_state: RwLock<ListenerState>,
}

impl PipelineStats {
    pub fn new(shard_count: usize) -> Self {
        Self {
            shards: (0..shard_count).map(|_| ShardStats::default()).collect(),
            max_queue_depth: AtomicUsize::new(0),
            listener_state: RwLock::new(ListenerState::Disconnected),
        }
    }

    pub fn shard(
        &self,
        index: usize,
    ) -> Option<&ShardStats> {
        self.shards.get(index)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Records an ingest queue depth; true when it is a new maximum
    pub fn record_queue_depth(
        &self,
        depth: usize,
    ) -> bool {
        self.max_queue_depth.fetch_max(depth, Ordering::Relaxed) < depth
    }

    pub fn max_queue_depth(&self) -> usize {
        self.max_queue_depth.load(Ordering::Relaxed)
    }

    pub fn set_listener_state(
        &self,
        state: ListenerState,
    ) {
        *self.listener_state.write() = state;
    }

    pub fn listener_state(&self) -> ListenerState {
        *self.listener_state.read()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            listener: self.listener_state(),
            max_queue_depth: self.max_queue_depth(),
            shards: self.shards.iter().map(ShardStats::snapshot).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub listener: ListenerState,
    pub max_queue_depth: usize,
    pub shards: Vec<ShardSnapshot>,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "listener={} max_queue_depth={}", self.listener, self.max_queue_depth)?;
        for (i, s) in self.shards.iter().enumerate() {
            write!(
                f,
                " shard{}={}/{}/{}/{}",
                i, s.processed, s.skipped, s.retried, s.write_failed
            )?;
        }
        Ok(())
    }
}
