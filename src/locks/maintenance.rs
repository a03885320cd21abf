//! Clock calibration and slot reclamation run on every fresh acquire.

use super::session::LockSession;
use crate::fs::SharedFile;
use chrono::Utc;
use tracing::{debug, warn};

impl<F: SharedFile> LockSession<F> {
    /// Re-anchor the calibrated clock if the file's newest timestamp moved.
    pub(super) fn update_current_time(&mut self) {
        let Some(file) = self.file.as_ref() else {
            return;
        };
        match file.timestamps() {
            Ok(times) => {
                if let Some(newest) = times.newest() {
                    self.clock.observe(newest, Utc::now());
                }
            }
            Err(e) => debug!(error = %e, "failed to read lock file timestamps"),
        }
    }

    /// Reclaim slots left by processes on this machine, for this user, that
    /// are no longer running. Only such processes can be checked directly;
    /// everybody else is left to expiry.
    pub(super) fn cleanup_dead_processes_on_this_machine(&mut self) {
        if !self.config.use_process_id {
            return;
        }
        let Some(me) = self.identity.as_ref() else {
            return;
        };

        let dead: Vec<(usize, u32)> = self
            .store
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                r.verify_checksum()
                    && r.id() != me.id
                    && r.process_id != me.process_id
                    && r.machine_id == me.machine_id
                    && r.user() == me.user
            })
            .filter(|(_, r)| !self.probe.is_alive(r.process_id))
            .map(|(i, r)| (i, r.process_id))
            .collect();

        for (index, pid) in dead {
            warn!(slot = index, pid, "reclaiming lock of dead process on this machine");
            self.reclaim(index);
        }
    }

    /// Reclaim slots of other participants not touched within
    /// `expire_time_seconds`, judged by the conservative calibrated time.
    pub(super) fn cleanup_expired_records(&mut self) {
        let Some(limit) = self.config.expire_time_seconds else {
            return;
        };
        let Some(my_id) = self.identity.as_ref().map(|i| i.id) else {
            return;
        };

        let now = Utc::now();
        let expired: Vec<(usize, String, f64)> = self
            .store
            .iter()
            .enumerate()
            .filter(|(_, r)| r.verify_checksum() && r.id() != my_id)
            .map(|(i, r)| (i, r.user(), self.clock.min_age_seconds(r.touch_time(), now)))
            .filter(|(_, _, age)| *age > limit)
            .collect();

        for (index, user, age) in expired {
            warn!(slot = index, %user, age_seconds = age, "reclaiming expired lock");
            self.reclaim(index);
        }
    }

    /// Free a slot and write it back right away.
    fn reclaim(&mut self, index: usize) {
        if let Some(record) = self.store.get_mut(index) {
            record.reset();
        }
        if let Err(e) = self.write_slot(index) {
            warn!(slot = index, error = %e, "failed to write reclaimed slot");
        }
    }
}
