use crate::config::{LockConfig, RetryPolicy};
use crate::fs::MemoryFile;
use crate::identity::{FixedMachineIdentity, ProcessProbe};
use crate::locks::LockSession;
use crate::record::{LockRecord, RECORD_SIZE, slot_offset};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Machine id shared by every test session unless a test says otherwise.
pub(crate) const TEST_MACHINE: u64 = 0x5107_10C4;

/// A fresh path in the in-memory file registry.
pub(crate) fn memory_path() -> PathBuf {
    PathBuf::from(format!("/memory/{}.lock", Uuid::new_v4()))
}

/// Probe that reports the listed pids as dead and everything else as alive.
#[derive(Debug, Default, Clone)]
pub(crate) struct ScriptedProbe {
    dead: HashSet<u32>,
}

impl ScriptedProbe {
    pub(crate) fn dead(pids: &[u32]) -> Self {
        Self {
            dead: pids.iter().copied().collect(),
        }
    }
}

impl ProcessProbe for ScriptedProbe {
    fn is_alive(&self, pid: u32) -> bool {
        !self.dead.contains(&pid)
    }
}

/// Defaults, but giving up quickly instead of waiting 30 seconds.
pub(crate) fn quick_config() -> LockConfig {
    LockConfig {
        retry: RetryPolicy {
            max_attempts: Some(5),
            deadline_ms: Some(500),
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        },
        ..LockConfig::default()
    }
}

/// A memory-backed session with an identity set but no file opened.
pub(crate) fn memory_session(config: LockConfig, user: &str) -> LockSession<MemoryFile> {
    let mut session = LockSession::<MemoryFile>::with_backend(config)
        .with_machine_identity(FixedMachineIdentity(TEST_MACHINE));
    session.set_identity(Uuid::new_v4(), user).unwrap();
    session
}

/// A memory-backed session opened on `path`.
pub(crate) fn open_memory_session(path: &Path, user: &str) -> LockSession<MemoryFile> {
    let mut session = memory_session(quick_config(), user);
    session.open(path).unwrap();
    session
}

/// Decode slot `index` straight from the in-memory file.
pub(crate) fn read_slot(path: &Path, index: usize) -> LockRecord {
    let data = MemoryFile::contents(path).unwrap();
    let start = usize::try_from(slot_offset(index)).unwrap();
    let bytes: [u8; RECORD_SIZE] = data[start..start + RECORD_SIZE].try_into().unwrap();
    LockRecord::from_bytes(&bytes)
}

/// Put `record` into slot `index` without taking the range lock.
pub(crate) fn write_slot(path: &Path, index: usize, record: &LockRecord) {
    let offset = usize::try_from(slot_offset(index)).unwrap();
    MemoryFile::overwrite(path, offset, &record.to_bytes());
}

/// Number of slots currently in the in-memory file.
pub(crate) fn slot_count(path: &Path) -> usize {
    let len = MemoryFile::contents(path).unwrap().len();
    len / RECORD_SIZE - 1
}
