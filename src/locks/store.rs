//! In-memory snapshot of the lock file's slots.

use crate::record::LockRecord;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Every slot record read under the current hold, plus the slots that must
/// be written back on commit. Index `i` is slot `i` (file record `i + 1`).
#[derive(Debug, Clone, Default)]
pub(crate) struct LockStore {
    records: Vec<LockRecord>,
    dirty: BTreeSet<usize>,
}

impl LockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<LockRecord>) -> Self {
        Self {
            records,
            dirty: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, index: usize) -> Option<&LockRecord> {
        self.records.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut LockRecord> {
        self.records.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LockRecord> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.dirty.clear();
    }

    /// Slot carrying `id`, if any.
    pub fn position_of(&self, id: Uuid) -> Option<usize> {
        let wanted = *id.as_bytes();
        self.records.iter().position(|r| r.id == wanted)
    }

    /// Indices of all free slots.
    pub fn free_slots(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_free())
            .map(|(i, _)| i)
            .collect()
    }

    /// Append a free slot past the current end. It is not dirty: commit
    /// extends the file to cover it without writing its bytes.
    pub fn push_free(&mut self) -> usize {
        self.records.push(LockRecord::free());
        self.records.len() - 1
    }

    pub fn mark_dirty(&mut self, index: usize) {
        if index < self.records.len() {
            self.dirty.insert(index);
        }
    }

    #[cfg(test)]
    pub fn is_dirty(&self, index: usize) -> bool {
        self.dirty.contains(&index)
    }

    /// Dirty indices in ascending order; the set is emptied.
    pub fn take_dirty(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }
}
