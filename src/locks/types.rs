//! Result types returned by lock queries.

use crate::record::LockRecord;
use uuid::Uuid;

/// A claimed slot with a lock type, as returned by `get_all_locks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    /// Slot index (0-based, not counting the header).
    pub slot: usize,

    pub record: LockRecord,
}

impl LockEntry {
    pub fn id(&self) -> Uuid {
        self.record.id()
    }

    pub fn user(&self) -> String {
        self.record.user()
    }

    pub fn lock_type(&self) -> String {
        self.record.lock_type()
    }
}

impl std::fmt::Display for LockEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "slot {} (owner: {}, lock: {}, pid: {}, touched: {})",
            self.slot,
            self.record.user(),
            self.record.lock_type(),
            self.record.process_id,
            self.record.touch_time().to_rfc3339()
        )
    }
}

/// Outcome of reading the whole lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReadDocStatus {
    Ok,
    /// Short read or torn record; unlock and read again.
    TryAgain,
    /// Not a lock file.
    Abort(String),
}
