//! Slotlock: advisory multi-process locks coordinated through one shared file.
//!
//! Participants on any number of machines open the same lock file and each
//! claim a fixed-size slot in it, advertising a short lock type. The file is
//! guarded by a byte-range lock where the filesystem honors one, and by
//! per-record checksums where it does not. Stale slots are reclaimed when
//! their process has died (same machine) or they have not been touched for
//! a configurable time (any machine, using a clock calibrated against the
//! file's own timestamps).
//!
//! ```no_run
//! use slotlock::{LockConfig, LockSession};
//! use uuid::Uuid;
//!
//! let mut session = LockSession::new(LockConfig::default());
//! session.set_identity(Uuid::new_v4(), "build-agent")?;
//! session.open("/shared/project.lock")?;
//!
//! session.set_lock("write")?;
//! for other in session.get_foreign_locks(true)? {
//!     println!("{}", other);
//! }
//! session.remove_lock()?;
//! session.close();
//! # Ok::<(), slotlock::LockError>(())
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod fs;
pub mod identity;
pub mod locks;
pub mod record;

#[cfg(test)]
mod test_support;

pub use clock::ClockCalibrator;
pub use config::{LockConfig, RetryPolicy};
pub use error::{LockError, Result};
pub use identity::{
    ClientIdentity, FixedMachineIdentity, HostMachineIdentity, MachineIdentity, ProcessProbe,
    SystemProcessProbe,
};
pub use locks::{LockEntry, LockSession, SessionHold};
pub use record::LockRecord;
