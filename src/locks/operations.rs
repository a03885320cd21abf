//! Slot allocation and the public lock operations.

use super::acquire::Retry;
use super::session::LockSession;
use super::types::{LockEntry, ReadDocStatus};
use crate::error::{LockError, Result};
use crate::fs::SharedFile;
use crate::record::{LOCK_TYPE_BYTES, LockRecord};
use chrono::Utc;
use rand::seq::SliceRandom;
use tracing::{debug, info};

impl<F: SharedFile> LockSession<F> {
    /// Find our slot.
    ///
    /// When we have none and `for_write` is set, pick a free slot at random
    /// from at least `entropy_n` candidates, appending free slots to the
    /// store as needed. The byte-range lock is not a dependable mutex on
    /// every filesystem, so two writers may still pick the same slot; the
    /// wide random choice only makes that unlikely. The last writer wins.
    pub(super) fn find(&mut self, for_write: bool) -> Option<usize> {
        let id = self.identity.as_ref()?.id;

        if let Some(index) = self.store.position_of(id) {
            if self.cur_slot.is_some_and(|cur| cur != index) {
                debug!(slot = index, "our record moved slots");
            }
            return Some(index);
        }
        if !for_write {
            return None;
        }

        let mut open = self.store.free_slots();
        while open.len() < self.config.entropy_n {
            open.push(self.store.push_free());
        }
        open.choose(&mut rand::thread_rng()).copied()
    }

    /// Claim (or update) our slot with `lock_type`. An empty lock type keeps
    /// the slot but advertises no lock.
    pub fn set_lock(&mut self, lock_type: &str) -> Result<()> {
        let result = self.set_lock_inner(lock_type);
        self.track(result)
    }

    fn set_lock_inner(&mut self, lock_type: &str) -> Result<()> {
        check_lock_type(lock_type)?;
        let identity = self.identity.clone().ok_or(LockError::MissingIdentity)?;

        self.begin()?;

        let Some(index) = self.find(true) else {
            self.release_inner();
            return Err(LockError::InvalidArgument(
                "entropy_n must be greater than 0".to_string(),
            ));
        };

        let touch = self.clock.now_max(Utc::now());
        if let Some(record) = self.store.get_mut(index) {
            *record = LockRecord::stamped(&identity, lock_type, touch);
        }
        self.store.mark_dirty(index);
        self.cur_slot = Some(index);

        match self.commit() {
            Ok(()) => {
                debug!(slot = index, lock_type, "lock set");
                self.cur_lock = lock_type.to_string();
                Ok(())
            }
            Err(e) => {
                self.cur_slot = None;
                Err(e)
            }
        }
    }

    /// Give up our slot. Succeeds without writing when we hold none.
    pub fn remove_lock(&mut self) -> Result<()> {
        let result = self.remove_lock_inner();
        self.track(result)
    }

    fn remove_lock_inner(&mut self) -> Result<()> {
        self.begin()?;
        self.cur_lock.clear();

        let Some(index) = self.find(false) else {
            self.cur_slot = None;
            self.release_inner();
            return Ok(());
        };

        if let Some(record) = self.store.get_mut(index) {
            record.reset();
        }
        self.store.mark_dirty(index);
        let result = self.commit();
        self.cur_slot = None;
        debug!(slot = index, "lock removed");
        result
    }

    /// Refresh our slot's touch time so expiry does not reclaim it.
    ///
    /// Fails with `LockLost` when our slot no longer carries our id (it was
    /// expired, swept, or hijacked) or we never claimed one.
    pub fn touch_lock(&mut self) -> Result<()> {
        let result = self.touch_lock_inner();
        self.track(result)
    }

    fn touch_lock_inner(&mut self) -> Result<()> {
        let id = self
            .identity
            .as_ref()
            .map(|i| i.id)
            .ok_or(LockError::MissingIdentity)?;

        self.begin()?;

        let touch = self.clock.now_max(Utc::now());
        let slot = self.cur_slot.filter(|&index| {
            self.store
                .get(index)
                .is_some_and(|r| r.id() == id && r.verify_checksum())
        });

        match slot {
            Some(index) => {
                if let Some(record) = self.store.get_mut(index) {
                    record.set_touch_time(touch);
                    record.checksum = record.compute_checksum();
                }
                self.store.mark_dirty(index);
                self.commit()
            }
            None => {
                self.release_inner();
                Err(LockError::LockLost)
            }
        }
    }

    /// Overwrite any slot, ignoring who owns it. With `clear` the slot is
    /// freed, otherwise only its lock type is replaced. Meant for recovery
    /// tooling.
    pub fn hijack_set_lock(&mut self, slot: usize, lock_type: &str, clear: bool) -> Result<()> {
        let result = self.hijack_set_lock_inner(slot, lock_type, clear);
        self.track(result)
    }

    fn hijack_set_lock_inner(&mut self, slot: usize, lock_type: &str, clear: bool) -> Result<()> {
        if !clear {
            check_lock_type(lock_type)?;
        }

        self.begin()?;

        let len = self.store.len();
        let Some(record) = self.store.get_mut(slot) else {
            self.release_inner();
            return Err(LockError::SlotOutOfRange { index: slot, len });
        };

        if clear {
            record.reset();
        } else {
            record.set_lock_type(lock_type);
            record.seal();
        }
        self.store.mark_dirty(slot);

        if self.cur_slot == Some(slot) {
            if clear {
                self.cur_slot = None;
                self.cur_lock.clear();
            } else {
                self.cur_lock = lock_type.to_string();
            }
        }

        info!(slot, lock_type, clear, "hijacked lock slot");
        self.commit()
    }

    /// Every claimed slot with a non-empty lock type, ours included.
    ///
    /// With `use_mutex` the snapshot is taken under the byte-range lock.
    /// Without it the file is read lock-free, retrying torn reads; cheaper
    /// for pollers, at the price of a possibly stale answer. Inside a hold
    /// the held snapshot is returned either way.
    pub fn get_all_locks(&mut self, use_mutex: bool) -> Result<Vec<LockEntry>> {
        let result = self.get_all_locks_inner(use_mutex);
        self.track(result)
    }

    /// Like [`get_all_locks`](Self::get_all_locks), without our own slot.
    pub fn get_foreign_locks(&mut self, use_mutex: bool) -> Result<Vec<LockEntry>> {
        let my_id = self.identity.as_ref().map(|i| i.id);
        let locks = self.get_all_locks(use_mutex)?;
        Ok(locks
            .into_iter()
            .filter(|entry| Some(entry.id()) != my_id)
            .collect())
    }

    fn get_all_locks_inner(&mut self, use_mutex: bool) -> Result<Vec<LockEntry>> {
        if self.depth > 0 {
            return Ok(self.collect_locks());
        }

        if use_mutex {
            self.acquire_inner()?;
            let locks = self.collect_locks();
            self.release_inner();
            return Ok(locks);
        }

        if !self.is_open() {
            return Err(LockError::NotOpen);
        }
        let mut retry = Retry::start(&self.config.retry);
        loop {
            match self.read_doc() {
                ReadDocStatus::Ok => break,
                ReadDocStatus::TryAgain => retry.wait()?,
                ReadDocStatus::Abort(reason) => return Err(LockError::Corrupt(reason)),
            }
        }
        let locks = self.collect_locks();
        self.store.clear();
        Ok(locks)
    }

    fn collect_locks(&self) -> Vec<LockEntry> {
        self.store
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_free() && !r.is_lock_empty())
            .map(|(slot, record)| LockEntry {
                slot,
                record: *record,
            })
            .collect()
    }
}

fn check_lock_type(lock_type: &str) -> Result<()> {
    if lock_type.len() > LOCK_TYPE_BYTES - 1 {
        return Err(LockError::InvalidArgument(format!(
            "lock type '{}' is longer than {} bytes",
            lock_type,
            LOCK_TYPE_BYTES - 1
        )));
    }
    Ok(())
}
