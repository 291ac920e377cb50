//! Linear capped backoff shared by every reconnect/retry loop.
//!
//! The caller owns the loop; [`Backoff::wait`] only sleeps before the next
//! attempt and reports whether that attempt should run:
//!
//! ```ignore
//! let mut backoff = Backoff::new("listener", policy);
//! loop {
//!     match backoff.wait(Some(&mut shutdown)).await {
//!         BackoffWait::Ready { .. } => {}
//!         BackoffWait::Stopped | BackoffWait::Exhausted => break,
//!     }
//!     if client.reconnect().await.is_ok() {
//!         break;
//!     }
//! }
//! ```

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::warn;

use crate::BackoffPolicy;

/// Result of waiting for the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffWait {
    /// Wait elapsed, run attempt number `attempt`
    Ready { attempt: usize, waited: Duration },
    /// Shutdown was requested before or during the wait
    Stopped,
    /// `max_retries` attempts already ran
    Exhausted,
}

#[derive(Debug)]
pub struct Backoff {
    name: &'static str,
    policy: BackoffPolicy,
    attempt: usize,
}

impl Backoff {
    pub fn new(
        name: &'static str,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            name,
            policy,
            attempt: 0,
        }
    }

    /// Wait before attempt `attempt` (1-based): `min(attempt * step, max_delay)`
    pub fn delay_for(
        policy: &BackoffPolicy,
        attempt: usize,
    ) -> Duration {
        let step = policy.step_ms.saturating_mul(attempt as u64);
        Duration::from_millis(step.min(policy.max_delay_ms))
    }

    /// Number of attempts handed out so far
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Sleeps before the next attempt.
    ///
    /// With a shutdown receiver, a pending or arriving shutdown signal ends the
    /// wait early with [`BackoffWait::Stopped`]. A closed signal channel counts
    /// as shutdown.
    pub async fn wait(
        &mut self,
        shutdown: Option<&mut watch::Receiver<()>>,
    ) -> BackoffWait {
        if !self.policy.is_unlimited() && self.attempt >= self.policy.max_retries {
            return BackoffWait::Exhausted;
        }

        let mut shutdown = shutdown;
        if let Some(rx) = shutdown.as_deref_mut() {
            if rx.has_changed().unwrap_or(true) {
                return BackoffWait::Stopped;
            }
        }

        self.attempt += 1;
        let delay = Self::delay_for(&self.policy, self.attempt);
        warn!(name = self.name, attempt = self.attempt, wait = ?delay, "backoff before next attempt");

        match shutdown {
            Some(rx) => {
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = rx.changed() => {
                        return BackoffWait::Stopped;
                    }
                }
            }
            None => sleep(delay).await,
        }

        BackoffWait::Ready {
            attempt: self.attempt,
            waited: delay,
        }
    }
}
