mod syncer;

pub use syncer::*;

#[cfg(test)]
mod syncer_test;
