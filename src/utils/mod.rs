pub mod async_task;
pub mod backoff;

pub use backoff::*;

#[cfg(test)]
mod backoff_test;
