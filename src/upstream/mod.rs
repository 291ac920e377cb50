//! Source store access.
//!
//! The pipeline only depends on [`UpstreamClient`]; [`RespClient`] is the TCP
//! implementation speaking RESP2.
mod client;
pub mod resp;

pub use client::*;
pub use resp::Command;
pub use resp::Reply;


use std::collections::BTreeMap;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Connection to the source store
///
/// Each component owns its own client; a client is never shared between tasks.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UpstreamClient: Send + 'static {
    async fn connect(&mut self) -> Result<()>;

    /// Drops the current connection, if any, and connects again
    async fn reconnect(&mut self) -> Result<()>;

    async fn close(&mut self);

    /// Runs an arbitrary command; server error replies are returned as errors
    async fn execute(
        &mut self,
        command: &str,
        args: &[String],
    ) -> Result<Reply>;

    /// Blocks until the next pushed frame and returns its raw elements
    async fn read_pushed_message(&mut self) -> Result<Vec<Vec<u8>>>;

    async fn type_of(
        &mut self,
        key: &str,
    ) -> Result<String>;

    async fn read_hash_fields(
        &mut self,
        key: &str,
    ) -> Result<BTreeMap<String, String>>;
}
