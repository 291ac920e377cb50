use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Sizing of the listener -> dispatcher -> storer chain
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Number of persistence workers, one shard queue each
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,

    /// Capacity of every shard queue. A full queue blocks the dispatcher.
    #[serde(default = "default_shard_queue_capacity")]
    pub shard_queue_capacity: usize,

    /// Capacity of the listener -> dispatcher queue.
    /// The default of 1 makes the handoff effectively synchronous.
    #[serde(default = "default_ingest_queue_capacity")]
    pub ingest_queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shard_count: default_shard_count(),
            shard_queue_capacity: default_shard_queue_capacity(),
            ingest_queue_capacity: default_ingest_queue_capacity(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            return Err(invalid("pipeline.shard_count must be greater than 0"));
        }
        if self.shard_queue_capacity == 0 {
            return Err(invalid("pipeline.shard_queue_capacity must be greater than 0"));
        }
        if self.ingest_queue_capacity == 0 {
            return Err(invalid("pipeline.ingest_queue_capacity must be greater than 0"));
        }
        Ok(())
    }
}

fn default_shard_count() -> usize {
    5
}
fn default_shard_queue_capacity() -> usize {
    256
}
fn default_ingest_queue_capacity() -> usize {
    1
}
