//! Change-data-capture replication of a live key-value store.
//!
//! Mutation notifications published by the upstream store are turned into
//! keys, sharded by hash across persistence workers, re-read from upstream and
//! written atomically (record + version index entry) into a local sled store.
//! An admin line-protocol service and a length-framed query agent expose the
//! replica and the pipeline health.
//!
//! Data flow:
//! ```text
//! Listener --ingest--> Dispatcher --shard[i]--> Storer[i] --> LocalStore
//! ```

pub mod admin;
pub mod agent;
mod config;
pub mod constants;
mod errors;
pub mod node;
pub mod pipeline;
pub mod record;
pub mod storage;
pub mod upstream;
pub mod utils;

pub use config::*;
pub use errors::*;
pub use node::*;
