//! Change-data-capture pipeline.
//!
//! ```text
//! Listener -> ingest queue -> Dispatcher -> N shard queues -> N Storers -> LocalStore
//! ```
//!
//! Shutdown runs in the same direction: stopping the listener closes the
//! ingest queue, the dispatcher then closes every shard queue and each storer
//! exits once its queue is drained.
mod dispatcher;
mod listener;
mod stats;
mod storer;
mod storer_mgr;

pub use dispatcher::*;
pub use listener::*;
pub use stats::*;
pub use storer::*;
pub use storer_mgr::*;

#[cfg(test)]
mod dispatcher_test;
