//! Byte-range mutex emulation: acquire, release, read and write of the file.

use super::session::LockSession;
use super::store::LockStore;
use super::types::ReadDocStatus;
use crate::config::RetryPolicy;
use crate::error::{LockError, Result};
use crate::fs::{RangeLock, SharedFile};
use crate::record::{LockRecord, RECORD_SIZE, slot_offset};
use std::time::Instant;
use tracing::{debug, warn};

/// Region covered by the byte-range lock. The file must never grow past it.
pub const LOCK_REGION_SIZE: u64 = 1024 * 1024;

/// Attempt counter and backoff for one retry loop.
pub(super) struct Retry {
    policy: RetryPolicy,
    started: Instant,
    attempts: u32,
}

impl Retry {
    pub(super) fn start(policy: &RetryPolicy) -> Self {
        Self {
            policy: policy.clone(),
            started: Instant::now(),
            attempts: 0,
        }
    }

    /// Count a failed attempt, then sleep, or give up with `TimedOut`.
    pub(super) fn wait(&mut self) -> Result<()> {
        self.attempts += 1;
        let elapsed = self.started.elapsed();

        let out_of_attempts = self
            .policy
            .max_attempts
            .is_some_and(|max| self.attempts >= max);
        let deadline = self.policy.deadline();
        let past_deadline = deadline.is_some_and(|d| elapsed >= d);

        if out_of_attempts || past_deadline {
            return Err(LockError::TimedOut {
                attempts: self.attempts,
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            });
        }

        let mut pause = self.policy.backoff(self.attempts);
        if let Some(d) = deadline {
            pause = pause.min(d.saturating_sub(elapsed));
        }
        std::thread::sleep(pause);
        Ok(())
    }
}

impl<F: SharedFile> LockSession<F> {
    /// Take the byte-range lock and load every slot.
    ///
    /// Re-entrant: nested calls only bump a counter, and each needs a
    /// matching [`release`](Self::release). A fresh acquire also recalibrates
    /// the clock and reclaims slots of dead or expired participants.
    ///
    /// Waits according to the configured `RetryPolicy` and fails with
    /// `TimedOut` once it is exhausted.
    pub fn acquire(&mut self) -> Result<()> {
        let result = self.acquire_inner();
        self.track(result)
    }

    /// Undo one `acquire`. The byte range is unlocked, and the snapshot
    /// dropped, when the outermost acquire is released.
    pub fn release(&mut self) {
        self.release_inner();
    }

    pub(super) fn acquire_inner(&mut self) -> Result<()> {
        if self.depth > 0 {
            self.depth += 1;
            return Ok(());
        }

        let mut retry = Retry::start(&self.config.retry);
        loop {
            let file = self.file.as_mut().ok_or(LockError::NotOpen)?;
            match file.lock_range(0, LOCK_REGION_SIZE) {
                Ok(RangeLock::Acquired) => match self.read_doc() {
                    ReadDocStatus::Ok => {
                        self.depth = 1;
                        self.update_current_time();
                        self.cleanup_dead_processes_on_this_machine();
                        self.cleanup_expired_records();
                        return Ok(());
                    }
                    ReadDocStatus::TryAgain => {
                        debug!("byte range locked but read was torn, retrying");
                        self.unlock_file();
                    }
                    ReadDocStatus::Abort(reason) => {
                        self.unlock_file();
                        return Err(LockError::Corrupt(reason));
                    }
                },
                Ok(RangeLock::Busy) => {}
                Err(e) => {
                    return Err(LockError::Resource(format!(
                        "failed to lock byte range: {}",
                        e
                    )));
                }
            }
            retry.wait()?;
        }
    }

    pub(super) fn release_inner(&mut self) {
        if self.depth == 0 {
            debug_assert!(false, "release without a matching acquire");
            return;
        }
        self.depth -= 1;
        if self.depth > 0 {
            return;
        }
        self.unlock_file();
        self.store.clear();
    }

    fn unlock_file(&mut self) {
        if let Some(file) = self.file.as_mut()
            && let Err(e) = file.unlock_range(0, LOCK_REGION_SIZE)
        {
            warn!(error = %e, "failed to unlock byte range");
        }
    }

    pub(super) fn begin(&mut self) -> Result<()> {
        self.acquire_inner()
    }

    /// Write the dirty slots, then release. The release happens even when
    /// the write fails.
    pub(super) fn commit(&mut self) -> Result<()> {
        let written = self.write_doc();
        self.release_inner();
        written
    }

    /// Load the whole file into the store.
    pub(super) fn read_doc(&mut self) -> ReadDocStatus {
        let Some(file) = self.file.as_mut() else {
            return ReadDocStatus::Abort("lock file is not open".to_string());
        };

        let len = match file.len() {
            Ok(len) => len,
            Err(e) => {
                debug!(error = %e, "failed to stat lock file");
                return ReadDocStatus::TryAgain;
            }
        };
        if len % RECORD_SIZE as u64 != 0 {
            return ReadDocStatus::Abort(format!(
                "length {} is not a multiple of {}",
                len, RECORD_SIZE
            ));
        }

        let mut buf = [0u8; RECORD_SIZE];
        // Commonly zero bytes when two lockers thrash on one machine.
        if !matches!(file.read_at(0, &mut buf), Ok(n) if n == RECORD_SIZE) {
            return ReadDocStatus::TryAgain;
        }
        if !LockRecord::from_bytes(&buf).is_header() {
            return ReadDocStatus::Abort("missing magic header".to_string());
        }

        let slots = usize::try_from(len / RECORD_SIZE as u64)
            .unwrap_or(0)
            .saturating_sub(1);
        let mut records = Vec::with_capacity(slots);
        for index in 0..slots {
            if !matches!(file.read_at(slot_offset(index), &mut buf), Ok(n) if n == RECORD_SIZE) {
                return ReadDocStatus::TryAgain;
            }
            let mut record = LockRecord::from_bytes(&buf);
            if !record.is_free() && !record.verify_checksum() {
                debug!(slot = index, "checksum mismatch, record is torn");
                return ReadDocStatus::TryAgain;
            }
            record.terminate_strings();
            records.push(record);
        }

        self.store = LockStore::from_records(records);
        ReadDocStatus::Ok
    }

    /// Grow the file to cover every slot in the store, then write the dirty
    /// slots in ascending order. Appended free slots are never written, so a
    /// racing writer's record in that range survives. Keeps going past a
    /// failed slot and reports the first failure.
    pub(super) fn write_doc(&mut self) -> Result<()> {
        let end = slot_offset(self.store.len());
        let file = self.file.as_mut().ok_or(LockError::NotOpen)?;
        let mut first_error = file.extend_to(end).err().map(|e| {
            LockError::Write(format!("failed to grow lock file to {} bytes: {}", end, e))
        });

        for index in self.store.take_dirty() {
            if let Err(e) = self.write_slot(index) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub(super) fn write_slot(&mut self, index: usize) -> Result<()> {
        let len = self.store.len();
        let bytes = self
            .store
            .get(index)
            .ok_or(LockError::SlotOutOfRange { index, len })?
            .to_bytes();
        let file = self.file.as_mut().ok_or(LockError::NotOpen)?;
        file.write_at(slot_offset(index), &bytes)
            .map_err(|e| LockError::Write(format!("slot {}: {}", index, e)))
    }
}
