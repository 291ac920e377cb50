//! Read-only query agent over the local store.
mod protocol;
mod server;

pub use protocol::*;
pub use server::*;
