//! In-process SharedFile with fault injection.
//!
//! Files live in a process-wide registry keyed by path, so two sessions
//! opening the same path share contents and contend for the same range lock,
//! much like two handles to one file on disk. Dropping a handle releases any
//! lock it holds, the way closing a descriptor does.

use super::{FileTimes, RangeLock, SharedFile};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

static FILES: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<MemoryState>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
#[cfg_attr(not(test), allow(dead_code))]
struct MemoryState {
    data: Vec<u8>,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    lock_owner: Option<u64>,
    busy_injections: u32,
    writes: u64,
    world_accessible: bool,
}

impl MemoryState {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            data: Vec::new(),
            created: now,
            modified: now,
            lock_owner: None,
            busy_injections: 0,
            writes: 0,
            world_accessible: false,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

#[cfg(test)]
fn entry(path: &Path) -> Option<Arc<Mutex<MemoryState>>> {
    lock(&*FILES).get(path).cloned()
}

/// Handle to an in-memory lock file.
#[derive(Debug)]
pub struct MemoryFile {
    path: PathBuf,
    state: Arc<Mutex<MemoryState>>,
    handle: u64,
}

impl MemoryFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Fault injection and inspection, keyed by path.
#[cfg(test)]
impl MemoryFile {
    /// Make the next `count` range lock requests on `path` report busy.
    pub fn inject_busy(path: &Path, count: u32) {
        if let Some(state) = entry(path) {
            lock(&state).busy_injections = count;
        }
    }

    /// Current contents of `path`.
    pub fn contents(path: &Path) -> Option<Vec<u8>> {
        entry(path).map(|state| lock(&state).data.clone())
    }

    /// Write bytes without taking the range lock, like an uncooperative
    /// writer on another machine.
    pub fn overwrite(path: &Path, offset: usize, bytes: &[u8]) {
        if let Some(state) = entry(path) {
            let mut state = lock(&state);
            write_bytes(&mut state, offset, bytes);
        }
    }

    /// Replace the whole contents of `path`, creating it if needed.
    pub fn install(path: &Path, bytes: &[u8]) {
        let state = Arc::clone(
            lock(&*FILES)
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(MemoryState::new()))),
        );
        let mut state = lock(&state);
        state.data = bytes.to_vec();
        state.modified = Utc::now();
    }

    /// Number of writes made to `path` so far.
    pub fn write_count(path: &Path) -> u64 {
        entry(path).map(|state| lock(&state).writes).unwrap_or(0)
    }

    /// True while some handle holds the range lock on `path`.
    pub fn is_locked(path: &Path) -> bool {
        entry(path).is_some_and(|state| lock(&state).lock_owner.is_some())
    }

    pub fn is_world_accessible(path: &Path) -> bool {
        entry(path).is_some_and(|state| lock(&state).world_accessible)
    }
}

fn write_bytes(state: &mut MemoryState, offset: usize, bytes: &[u8]) {
    let end = offset + bytes.len();
    if state.data.len() < end {
        state.data.resize(end, 0);
    }
    state.data[offset..end].copy_from_slice(bytes);
    state.modified = Utc::now();
    state.writes += 1;
}

impl SharedFile for MemoryFile {
    fn open_or_create(path: &Path) -> io::Result<(Self, bool)> {
        let mut files = lock(&*FILES);
        let (state, created) = match files.get(path) {
            Some(state) => (Arc::clone(state), false),
            None => {
                let state = Arc::new(Mutex::new(MemoryState::new()));
                files.insert(path.to_path_buf(), Arc::clone(&state));
                (state, true)
            }
        };

        Ok((
            Self {
                path: path.to_path_buf(),
                state,
                handle: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            },
            created,
        ))
    }

    fn try_delete(path: &Path) -> io::Result<bool> {
        Ok(lock(&*FILES).remove(path).is_some())
    }

    fn len(&self) -> io::Result<u64> {
        Ok(lock(&self.state).data.len() as u64)
    }

    fn lock_range(&mut self, _offset: u64, _len: u64) -> io::Result<RangeLock> {
        let mut state = lock(&self.state);
        if state.busy_injections > 0 {
            state.busy_injections -= 1;
            return Ok(RangeLock::Busy);
        }
        match state.lock_owner {
            Some(owner) if owner != self.handle => Ok(RangeLock::Busy),
            _ => {
                state.lock_owner = Some(self.handle);
                Ok(RangeLock::Acquired)
            }
        }
    }

    fn unlock_range(&mut self, _offset: u64, _len: u64) -> io::Result<()> {
        let mut state = lock(&self.state);
        if state.lock_owner == Some(self.handle) {
            state.lock_owner = None;
        }
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let state = lock(&self.state);
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        if offset >= state.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(state.data.len() - offset);
        buf[..n].copy_from_slice(&state.data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let offset = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset too large"))?;
        write_bytes(&mut lock(&self.state), offset, buf);
        Ok(())
    }

    fn extend_to(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length too large"))?;
        let mut state = lock(&self.state);
        if state.data.len() < len {
            state.data.resize(len, 0);
            state.modified = Utc::now();
        }
        Ok(())
    }

    fn timestamps(&self) -> io::Result<FileTimes> {
        let state = lock(&self.state);
        Ok(FileTimes {
            created: Some(state.created),
            accessed: None,
            modified: Some(state.modified),
        })
    }

    fn set_world_accessible(&mut self) -> io::Result<()> {
        lock(&self.state).world_accessible = true;
        Ok(())
    }
}

impl Drop for MemoryFile {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if state.lock_owner == Some(self.handle) {
            state.lock_owner = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn unique_path() -> PathBuf {
        PathBuf::from(format!("/memory/{}.lock", Uuid::new_v4()))
    }

    #[test]
    fn handles_share_contents() {
        let path = unique_path();
        let (mut a, created_a) = MemoryFile::open_or_create(&path).unwrap();
        let (mut b, created_b) = MemoryFile::open_or_create(&path).unwrap();
        assert!(created_a);
        assert!(!created_b);

        a.write_at(4, b"xy").unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(b.read_at(0, &mut buf).unwrap(), 6);
        assert_eq!(&buf, b"\0\0\0\0xy");
    }

    #[test]
    fn extend_to_keeps_contents() {
        let path = unique_path();
        let (mut a, _) = MemoryFile::open_or_create(&path).unwrap();
        a.write_at(0, b"hdr").unwrap();

        a.extend_to(16).unwrap();
        a.extend_to(8).unwrap();

        let data = MemoryFile::contents(&path).unwrap();
        assert_eq!(data.len(), 16);
        assert_eq!(&data[..3], b"hdr");
        assert!(data[3..].iter().all(|&b| b == 0));
        assert_eq!(MemoryFile::write_count(&path), 1);
    }

    #[test]
    fn range_lock_contention_and_drop() {
        let path = unique_path();
        let (mut a, _) = MemoryFile::open_or_create(&path).unwrap();
        let (mut b, _) = MemoryFile::open_or_create(&path).unwrap();

        assert_eq!(a.lock_range(0, 1).unwrap(), RangeLock::Acquired);
        assert_eq!(b.lock_range(0, 1).unwrap(), RangeLock::Busy);
        assert!(MemoryFile::is_locked(&path));

        drop(a);
        assert!(!MemoryFile::is_locked(&path));
        assert_eq!(b.lock_range(0, 1).unwrap(), RangeLock::Acquired);
    }

    #[test]
    fn injected_busy_is_consumed() {
        let path = unique_path();
        let (mut a, _) = MemoryFile::open_or_create(&path).unwrap();
        MemoryFile::inject_busy(&path, 2);

        assert_eq!(a.lock_range(0, 1).unwrap(), RangeLock::Busy);
        assert_eq!(a.lock_range(0, 1).unwrap(), RangeLock::Busy);
        assert_eq!(a.lock_range(0, 1).unwrap(), RangeLock::Acquired);
    }

    #[test]
    fn delete_detaches_registry_entry() {
        let path = unique_path();
        let (_a, _) = MemoryFile::open_or_create(&path).unwrap();
        assert!(MemoryFile::try_delete(&path).unwrap());
        assert!(!MemoryFile::try_delete(&path).unwrap());
        assert!(MemoryFile::contents(&path).is_none());
    }
}
