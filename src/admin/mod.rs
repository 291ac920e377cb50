//! Administrative line-protocol service.
//!
//! Each request line is split on whitespace into a command name and its
//! arguments. Every response is one `+ <result>` or `- <error>` line followed
//! by an `elapsed <seconds> sec` line.
mod commands;
mod registry;
mod service;

pub use commands::*;
pub use registry::*;
pub use service::*;

#[cfg(test)]
mod registry_test;
