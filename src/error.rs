//! Error types for slotlock.
//!
//! Uses thiserror for derive macros. Transient conditions (a busy byte range,
//! a torn or short read) are retried inside the session and never show up
//! here, except as `TimedOut` once the retry policy gives up.

use thiserror::Error;

/// Main error type for lock session operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LockError {
    /// An operation needs an open lock file.
    #[error("lock file is not open")]
    NotOpen,

    /// The session already has a lock file open.
    #[error("lock file is already open")]
    AlreadyOpen,

    /// `open` was called before `set_identity`, or with a blank user.
    #[error("no identity, or user is blank")]
    MissingIdentity,

    /// Caller supplied an argument the record layout cannot hold.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The file could not be created, opened, locked or stat-ed.
    #[error("{0}")]
    Resource(String),

    /// The file is not a lock file (bad header or impossible length).
    #[error("lock file is corrupt: {0}")]
    Corrupt(String),

    /// Writing a slot back failed. The byte range was still released.
    #[error("failed to write lock record: {0}")]
    Write(String),

    /// The retry policy ran out before the byte range could be acquired.
    #[error("timed out after {attempts} attempts ({elapsed_ms} ms)")]
    TimedOut { attempts: u32, elapsed_ms: u64 },

    /// Slot index passed to an administrative call does not exist.
    #[error("slot {index} out of range (file has {len} slots)")]
    SlotOutOfRange { index: usize, len: usize },

    /// Our slot was reclaimed (expired, swept, or hijacked) or never claimed.
    #[error("our lock slot is gone")]
    LockLost,

    /// Configuration failed to parse or validate.
    #[error("{0}")]
    Config(String),
}

impl LockError {
    /// True when retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LockError::TimedOut { .. } | LockError::Write(_))
    }
}

/// Result type alias for slotlock operations.
pub type Result<T> = std::result::Result<T, LockError>;
