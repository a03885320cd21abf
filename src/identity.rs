//! Participant identity, machine fingerprint, and process liveness.
//!
//! A process id only means something within one machine and one user, so a
//! participant is identified by `{id, user, process_id, machine_id}`. The
//! machine fingerprint and the liveness probe are injected so that tests and
//! unusual platforms can supply their own.

use crate::record::USER_BYTES;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Who we are inside the lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub id: Uuid,
    pub user: String,
    pub process_id: u32,
    pub machine_id: u64,
}

impl ClientIdentity {
    /// Build an identity, truncating `user` to what fits in a record.
    pub fn new(id: Uuid, user: &str, process_id: u32, machine_id: u64) -> Self {
        Self {
            id,
            user: truncate_user(user),
            process_id,
            machine_id,
        }
    }

    /// A usable identity has a non-nil id and a non-blank user.
    pub fn is_complete(&self) -> bool {
        !self.id.is_nil() && !self.user.is_empty()
    }
}

/// Cut `user` to at most `USER_BYTES - 1` bytes without splitting a character.
pub fn truncate_user(user: &str) -> String {
    let max = USER_BYTES - 1;
    if user.len() <= max {
        return user.to_string();
    }
    let mut end = max;
    while !user.is_char_boundary(end) {
        end -= 1;
    }
    user[..end].to_string()
}

fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Source of a stable per-machine 64-bit value. Together with the user it
/// defines the domain in which process ids are comparable. Zero means unknown.
pub trait MachineIdentity {
    fn machine_id(&self) -> u64;
}

/// Fingerprint derived from the host name and, when present, the OS machine id.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostMachineIdentity;

impl MachineIdentity for HostMachineIdentity {
    fn machine_id(&self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(host_name().as_bytes());
        for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
            if let Ok(contents) = std::fs::read(path) {
                hasher.update(&contents);
                break;
            }
        }
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(prefix)
    }
}

/// A machine id fixed up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedMachineIdentity(pub u64);

impl MachineIdentity for FixedMachineIdentity {
    fn machine_id(&self) -> u64 {
        self.0
    }
}

/// Answers whether a process on this machine is still running.
pub trait ProcessProbe {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessProbe;

impl ProcessProbe for SystemProcessProbe {
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        // SAFETY: signal 0 performs the permission and existence checks only.
        let result = unsafe { libc::kill(pid, 0) };
        if result == 0 {
            return true;
        }
        // EPERM: it exists but belongs to someone else.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        true
    }
}
