//! Clock calibration against the lock file's own timestamps.
//!
//! Participants on different machines cannot trust each other's wall clocks,
//! but they all see the same file timestamps from the file server. Whenever
//! the newest of the file's timestamps changes we re-anchor: calibrated time
//! is that file time plus however long our local clock has run since.

use chrono::{DateTime, Utc};

/// Timestamps reported for the lock file. Any of them may be unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTimes {
    pub created: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl FileTimes {
    /// The newest of the available timestamps.
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        [self.created, self.accessed, self.modified]
            .into_iter()
            .flatten()
            .max()
    }
}

/// Maps local time onto the file server's time base.
#[derive(Debug, Clone, Default)]
pub struct ClockCalibrator {
    epoch: Option<Epoch>,
}

#[derive(Debug, Clone, Copy)]
struct Epoch {
    from_file: DateTime<Utc>,
    from_clock: DateTime<Utc>,
}

impl ClockCalibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the newest file timestamp seen at `local_now`. Re-anchors only
    /// when the file time actually moved.
    pub fn observe(&mut self, file_max: DateTime<Utc>, local_now: DateTime<Utc>) {
        let unchanged = self.epoch.is_some_and(|e| e.from_file == file_max);
        if !unchanged {
            self.epoch = Some(Epoch {
                from_file: file_max,
                from_clock: local_now,
            });
        }
    }

    /// `epoch_from_file + (local_now - epoch_from_clock)`, or `local_now`
    /// before the first observation or when the sum is out of range.
    pub fn calibrated_now(&self, local_now: DateTime<Utc>) -> DateTime<Utc> {
        self.epoch
            .and_then(|e| e.from_file.checked_add_signed(local_now - e.from_clock))
            .unwrap_or(local_now)
    }

    /// The earlier of calibrated and local time. Used when judging age, so a
    /// clock running fast here cannot expire someone else's lock early.
    pub fn now_min(&self, local_now: DateTime<Utc>) -> DateTime<Utc> {
        self.calibrated_now(local_now).min(local_now)
    }

    /// The later of calibrated and local time. Used when stamping, so a clock
    /// running slow here cannot make a fresh lock look old.
    pub fn now_max(&self, local_now: DateTime<Utc>) -> DateTime<Utc> {
        self.calibrated_now(local_now).max(local_now)
    }

    /// Seconds between `then` and the conservative (minimum) current time.
    pub fn min_age_seconds(&self, then: DateTime<Utc>, local_now: DateTime<Utc>) -> f64 {
        let age = self.now_min(local_now) - then;
        age.num_microseconds()
            .map(|us| us as f64 / 1_000_000.0)
            .unwrap_or_else(|| age.num_seconds() as f64)
    }
}
