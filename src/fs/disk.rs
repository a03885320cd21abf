//! SharedFile backed by a real file.

use super::{FileTimes, RangeLock, SharedFile};
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A lock file on disk (local or on a network share).
#[derive(Debug)]
pub struct DiskFile {
    file: File,
    path: PathBuf,
}

impl DiskFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SharedFile for DiskFile {
    fn open_or_create(path: &Path) -> io::Result<(Self, bool)> {
        let created = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path);

        let (file, created) = match created {
            Ok(file) => (file, true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let file = OpenOptions::new().read(true).write(true).open(path)?;
                (file, false)
            }
            Err(e) => return Err(e),
        };

        Ok((
            Self {
                file,
                path: path.to_path_buf(),
            },
            created,
        ))
    }

    fn try_delete(path: &Path) -> io::Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn lock_range(&mut self, offset: u64, len: u64) -> io::Result<RangeLock> {
        if posix::set_lock(&self.file, posix::LockKind::Write, offset, len)? {
            Ok(RangeLock::Acquired)
        } else {
            Ok(RangeLock::Busy)
        }
    }

    fn unlock_range(&mut self, offset: u64, len: u64) -> io::Result<()> {
        posix::set_lock(&self.file, posix::LockKind::Unlock, offset, len).map(|_| ())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        self.file.flush()
    }

    fn extend_to(&mut self, len: u64) -> io::Result<()> {
        if self.file.metadata()?.len() < len {
            self.file.set_len(len)?;
        }
        Ok(())
    }

    fn timestamps(&self) -> io::Result<FileTimes> {
        let meta = self.file.metadata()?;
        Ok(FileTimes {
            created: meta.created().ok().map(DateTime::<Utc>::from),
            accessed: meta.accessed().ok().map(DateTime::<Utc>::from),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    #[cfg(unix)]
    fn set_world_accessible(&mut self) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o666))
    }

    #[cfg(not(unix))]
    fn set_world_accessible(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
mod posix {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    #[cfg(target_os = "linux")]
    const SET_LOCK: libc::c_int = libc::F_OFD_SETLK;
    #[cfg(not(target_os = "linux"))]
    const SET_LOCK: libc::c_int = libc::F_SETLK;

    #[derive(Debug, Clone, Copy)]
    pub(super) enum LockKind {
        Write,
        Unlock,
    }

    /// Non-blocking record lock request. `Ok(false)` when the range is busy.
    pub(super) fn set_lock(file: &File, kind: LockKind, offset: u64, len: u64) -> io::Result<bool> {
        let l_type = match kind {
            LockKind::Write => libc::F_WRLCK,
            LockKind::Unlock => libc::F_UNLCK,
        };

        // SAFETY: flock is a plain C struct; all-zero is a valid value (and
        // l_pid must be zero for open file description locks).
        let mut fl: libc::flock = unsafe { std::mem::zeroed() };
        fl.l_type = l_type as libc::c_short;
        fl.l_whence = libc::SEEK_SET as libc::c_short;
        fl.l_start = offset as libc::off_t;
        fl.l_len = len as libc::off_t;

        // SAFETY: the descriptor is owned by `file` and `fl` outlives the call.
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), SET_LOCK, &mut fl as *mut libc::flock) };
        if rc == 0 {
            return Ok(true);
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EAGAIN || code == libc::EACCES => Ok(false),
            _ => Err(err),
        }
    }
}

#[cfg(not(unix))]
mod posix {
    use std::fs::File;
    use std::io;

    #[derive(Debug, Clone, Copy)]
    pub(super) enum LockKind {
        Write,
        Unlock,
    }

    pub(super) fn set_lock(_file: &File, _kind: LockKind, _offset: u64, _len: u64) -> io::Result<bool> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "byte-range locks are only implemented for unix targets",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_or_create_reports_creator() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("slots.lock");

        let (_first, created) = DiskFile::open_or_create(&path).unwrap();
        assert!(created);
        let (_second, created) = DiskFile::open_or_create(&path).unwrap();
        assert!(!created);
    }

    #[test]
    fn positioned_read_write() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("slots.lock");
        let (mut file, _) = DiskFile::open_or_create(&path).unwrap();

        file.write_at(256, b"abc").unwrap();
        assert_eq!(file.len().unwrap(), 259);

        let mut buf = [0u8; 8];
        let n = file.read_at(256, &mut buf).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], b"abc");

        // Gap before the write reads back as zeros.
        let mut gap = [1u8; 4];
        assert_eq!(file.read_at(0, &mut gap).unwrap(), 4);
        assert_eq!(gap, [0; 4]);
    }

    #[test]
    fn extend_to_only_grows() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("slots.lock");
        let (mut file, _) = DiskFile::open_or_create(&path).unwrap();

        file.write_at(0, b"keep").unwrap();
        file.extend_to(512).unwrap();
        assert_eq!(file.len().unwrap(), 512);

        file.extend_to(128).unwrap();
        assert_eq!(file.len().unwrap(), 512);

        let mut buf = [0u8; 4];
        file.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"keep");
    }

    #[test]
    fn try_delete_missing_is_false() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.lock");
        assert!(!DiskFile::try_delete(&path).unwrap());

        std::fs::write(&path, b"").unwrap();
        assert!(DiskFile::try_delete(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn timestamps_include_modified() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("slots.lock");
        let (file, _) = DiskFile::open_or_create(&path).unwrap();
        let times = file.timestamps().unwrap();
        assert!(times.modified.is_some());
        assert!(times.newest().is_some());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn range_lock_excludes_second_handle() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("slots.lock");
        let (mut a, _) = DiskFile::open_or_create(&path).unwrap();
        let (mut b, _) = DiskFile::open_or_create(&path).unwrap();

        assert_eq!(a.lock_range(0, 1024).unwrap(), RangeLock::Acquired);
        assert_eq!(b.lock_range(0, 1024).unwrap(), RangeLock::Busy);

        a.unlock_range(0, 1024).unwrap();
        assert_eq!(b.lock_range(0, 1024).unwrap(), RangeLock::Acquired);
        b.unlock_range(0, 1024).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn world_accessible_sets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("slots.lock");
        let (mut file, _) = DiskFile::open_or_create(&path).unwrap();
        file.set_world_accessible().unwrap();
        file.set_world_accessible().unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o666);
    }
}
