use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Linear, capped backoff template
///
/// The n-th attempt (n >= 1) waits `min(n * step_ms, max_delay_ms)` before running.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of attempts (0 means unlimited)
    #[serde(default)]
    pub max_retries: usize,

    /// Wait added per attempt (unit: milliseconds)
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,

    /// Upper bound of a single wait (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::reconnect()
    }
}

impl BackoffPolicy {
    /// Unbounded 1s-step policy capped at 30s, used for upstream reconnects
    pub fn reconnect() -> Self {
        Self {
            max_retries: 0,
            step_ms: default_step_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_retries == 0
    }

    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.step_ms == 0 {
            return Err(invalid(format!("retry.{name}.step_ms must be greater than 0")));
        }
        if self.max_delay_ms < self.step_ms {
            return Err(invalid(format!(
                "retry.{name}.max_delay_ms ({}) must not be lower than step_ms ({})",
                self.max_delay_ms, self.step_ms
            )));
        }
        Ok(())
    }
}

/// Divide strategies by component
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    // Notification listener reconnect
    #[serde(default)]
    pub listener: BackoffPolicy,

    // Persistence worker reconnect, always unbounded so a dequeued key is never dropped
    #[serde(default)]
    pub storer: BackoffPolicy,

    // Local store batch write
    #[serde(default = "default_local_store")]
    pub local_store: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            listener: BackoffPolicy::reconnect(),
            storer: BackoffPolicy::reconnect(),
            local_store: default_local_store(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.listener.validate("listener")?;
        self.storer.validate("storer")?;
        self.local_store.validate("local_store")?;
        if !self.storer.is_unlimited() {
            return Err(invalid("retry.storer.max_retries must be 0 (unlimited)"));
        }
        if self.local_store.is_unlimited() {
            return Err(invalid("retry.local_store.max_retries must be bounded (> 0)"));
        }
        Ok(())
    }
}

fn default_local_store() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        step_ms: 100,
        max_delay_ms: 1000,
    }
}
fn default_step_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
