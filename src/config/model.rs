//! LockConfig struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for a lock session.
///
/// Every participant sharing a lock file should agree on `entropy_n` and
/// `expire_time_seconds`; the remaining settings are local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    // =========================================================================
    // Slot allocation
    // =========================================================================
    /// Minimum number of free slots considered before picking one at random.
    /// Higher values lower the chance of two writers claiming the same slot.
    #[serde(default = "default_entropy_n")]
    pub entropy_n: usize,

    // =========================================================================
    // Liveness
    // =========================================================================
    /// Seconds after which another participant's record is considered stale
    /// and reclaimed. `None` disables time-based expiry. Participants must
    /// call `touch_lock` more often than this when it is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_time_seconds: Option<f64>,

    /// Reclaim records of dead processes on this machine, for this user.
    #[serde(default = "default_true")]
    pub use_process_id: bool,

    /// Try to delete the lock file in `open` and `close`.
    ///
    /// Only meaningful on filesystems that refuse to delete a file somebody
    /// still has open. On POSIX a delete always succeeds and would split the
    /// participants across two inodes, hence off by default.
    #[serde(default)]
    pub delete_file_at_open_close: bool,

    // =========================================================================
    // Waiting
    // =========================================================================
    /// How long `acquire` keeps polling for the byte-range lock.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            entropy_n: default_entropy_n(),
            expire_time_seconds: None,
            use_process_id: default_true(),
            delete_file_at_open_close: false,
            retry: RetryPolicy::default(),
        }
    }
}
