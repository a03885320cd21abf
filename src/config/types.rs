//! Configuration types and defaults for slotlock.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for the byte-range lock and for lock-free reads.
///
/// A busy range or a torn read is retried after an exponential backoff
/// (`initial_backoff_ms`, doubling, capped at `max_backoff_ms`). The loop
/// stops after `max_attempts` attempts or once `deadline_ms` has elapsed,
/// whichever comes first. With both unset the loop never gives up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: Option<u64>,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            deadline_ms: default_deadline_ms(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Retry until the lock is obtained, like the classic spin loop.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            deadline_ms: None,
            ..Self::default()
        }
    }

    /// Give up after `attempts` tries with no deadline.
    pub fn attempts(attempts: u32) -> Self {
        Self {
            max_attempts: Some(attempts),
            deadline_ms: None,
            ..Self::default()
        }
    }

    /// Deadline as a `Duration`, if any.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Sleep before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Default entropy: 64 slots * 128 bytes = 8 KiB of lock file.
pub fn default_entropy_n() -> usize {
    64
}

pub fn default_deadline_ms() -> Option<u64> {
    Some(30_000)
}

pub fn default_initial_backoff_ms() -> u64 {
    1
}

pub fn default_max_backoff_ms() -> u64 {
    50
}

pub fn default_true() -> bool {
    true
}
