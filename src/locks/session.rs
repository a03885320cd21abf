//! LockSession construction, identity, open and close.

use super::store::LockStore;
use crate::clock::ClockCalibrator;
use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::fs::{DiskFile, SharedFile};
use crate::identity::{
    ClientIdentity, HostMachineIdentity, MachineIdentity, ProcessProbe, SystemProcessProbe,
};
use crate::record::LockRecord;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One participant's connection to a lock file.
///
/// A session owns its file handle, identity, and slot snapshot; sessions are
/// independent of each other even within one process. All methods take
/// `&mut self` and a session is not meant to be shared across threads.
///
/// Typical use:
/// - `set_identity`
/// - `open`
/// - `set_lock` / `touch_lock` / `get_all_locks`, optionally inside `hold()`
/// - `remove_lock`
/// - `close` (also done on drop)
pub struct LockSession<F: SharedFile = DiskFile> {
    pub(super) config: LockConfig,
    pub(super) machine: Box<dyn MachineIdentity>,
    pub(super) probe: Box<dyn ProcessProbe>,
    pub(super) identity: Option<ClientIdentity>,
    pub(super) file: Option<F>,
    pub(super) path: Option<PathBuf>,
    /// Nesting depth of `acquire`; the byte range is held while non-zero.
    pub(super) depth: u32,
    pub(super) store: LockStore,
    pub(super) clock: ClockCalibrator,
    /// Slot we last claimed.
    pub(super) cur_slot: Option<usize>,
    /// Lock type we last set.
    pub(super) cur_lock: String,
    pub(super) last_error: Option<String>,
}

impl LockSession<DiskFile> {
    /// A session over a file on disk, with the host fingerprint and the
    /// operating system's process table.
    pub fn new(config: LockConfig) -> Self {
        Self::with_backend(config)
    }
}

impl<F: SharedFile> LockSession<F> {
    /// A session over any `SharedFile` implementation.
    pub fn with_backend(config: LockConfig) -> Self {
        Self {
            config,
            machine: Box::new(HostMachineIdentity),
            probe: Box::new(SystemProcessProbe),
            identity: None,
            file: None,
            path: None,
            depth: 0,
            store: LockStore::new(),
            clock: ClockCalibrator::new(),
            cur_slot: None,
            cur_lock: String::new(),
            last_error: None,
        }
    }

    /// Replace the machine fingerprint provider. Takes effect at the next
    /// `set_identity`.
    pub fn with_machine_identity(mut self, machine: impl MachineIdentity + 'static) -> Self {
        self.machine = Box::new(machine);
        self
    }

    /// Replace the process liveness probe.
    pub fn with_process_probe(mut self, probe: impl ProcessProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Set who we are. `user` is typically a host or account name and is
    /// cut to 31 bytes. Must happen before `open`.
    pub fn set_identity(&mut self, id: Uuid, user: &str) -> Result<()> {
        let identity = ClientIdentity::new(id, user, std::process::id(), self.machine.machine_id());
        self.set_client_identity(identity)
    }

    /// Set a fully specified identity, for callers that track process and
    /// machine ids themselves.
    pub fn set_client_identity(&mut self, identity: ClientIdentity) -> Result<()> {
        if self.is_open() {
            return self.track(Err(LockError::AlreadyOpen));
        }
        self.identity = Some(identity);
        Ok(())
    }

    pub fn identity(&self) -> Option<&ClientIdentity> {
        self.identity.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Lock type we last set. Does not read the file.
    pub fn current_lock(&self) -> &str {
        &self.cur_lock
    }

    /// Most recent error message, kept until `close`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True while this session holds the byte-range lock.
    pub fn is_held(&self) -> bool {
        self.depth > 0
    }

    /// Open the lock file at `path`, creating it (with its header) if absent,
    /// then run one acquire/release cycle to prove the file is usable.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let result = self.open_inner(path.as_ref());
        self.track(result)
    }

    fn open_inner(&mut self, path: &Path) -> Result<()> {
        if self.is_open() {
            return Err(LockError::AlreadyOpen);
        }
        if !self.identity.as_ref().is_some_and(|i| i.is_complete()) {
            return Err(LockError::MissingIdentity);
        }

        if self.config.delete_file_at_open_close {
            // A successful delete means nobody had it open: start clean.
            match F::try_delete(path) {
                Ok(true) => debug!(path = %path.display(), "deleted unused lock file"),
                Ok(false) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "lock file in use"),
            }
        }

        let (mut file, created) = F::open_or_create(path).map_err(|e| {
            LockError::Resource(format!(
                "failed to open lock file '{}': {}",
                path.display(),
                e
            ))
        })?;

        if created {
            if let Err(e) = file.set_world_accessible() {
                warn!(path = %path.display(), error = %e, "failed to open up lock file permissions");
            }
            if let Err(e) = file.write_at(0, &LockRecord::header().to_bytes()) {
                drop(file);
                let _ = F::try_delete(path);
                return Err(LockError::Resource(format!(
                    "failed to write lock file header '{}': {}",
                    path.display(),
                    e
                )));
            }
        }

        self.file = Some(file);
        self.path = Some(path.to_path_buf());

        if let Err(e) = self.acquire_inner() {
            self.file = None;
            self.path = None;
            return Err(e);
        }
        self.release_inner();

        info!(path = %path.display(), created, "opened lock file");
        Ok(())
    }

    /// Close the lock file. Remove your lock first; a lock left behind stays
    /// in the file until it expires or is swept.
    pub fn close(&mut self) {
        if self.file.is_none() {
            return;
        }

        if !self.cur_lock.is_empty() {
            warn!(lock = %self.cur_lock, "closing lock file while still holding a lock");
        }
        if self.depth > 0 {
            warn!(depth = self.depth, "closing lock file inside acquire");
            self.depth = 0;
        }

        // Dropping the handle releases any byte-range lock.
        self.file = None;

        if let Some(path) = self.path.take() {
            if self.config.delete_file_at_open_close {
                match F::try_delete(&path) {
                    Ok(true) => debug!(path = %path.display(), "deleted lock file on close"),
                    Ok(false) => {}
                    Err(e) => debug!(path = %path.display(), error = %e, "lock file still in use"),
                }
            }
            info!(path = %path.display(), "closed lock file");
        }

        self.store.clear();
        self.cur_slot = None;
        self.cur_lock.clear();
        self.last_error = None;
    }

    /// Current time mapped onto the lock file's time base.
    pub fn calibrated_now(&self) -> DateTime<Utc> {
        self.clock.calibrated_now(Utc::now())
    }

    /// Earlier of calibrated and local time.
    pub fn calibrated_now_min(&self) -> DateTime<Utc> {
        self.clock.now_min(Utc::now())
    }

    /// Later of calibrated and local time.
    pub fn calibrated_now_max(&self) -> DateTime<Utc> {
        self.clock.now_max(Utc::now())
    }

    /// Conservative age in seconds of a timestamp such as a record's touch.
    pub fn min_age_seconds(&self, then: DateTime<Utc>) -> f64 {
        self.clock.min_age_seconds(then, Utc::now())
    }

    /// Remember the message of a failed result.
    pub(super) fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        result
    }
}

impl<F: SharedFile> Drop for LockSession<F> {
    fn drop(&mut self) {
        self.close();
    }
}
