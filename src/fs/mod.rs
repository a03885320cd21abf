//! Shared lock file access.
//!
//! The protocol needs very little from the file it coordinates through:
//! positioned reads and writes, grow-only extension, a byte-range advisory
//! lock, the file's timestamps, permissive permissions, and a best-effort
//! delete. That contract is the [`SharedFile`] trait.
//!
//! # Implementations
//!
//! - [`DiskFile`]: a real file. On Unix the range lock is a POSIX record
//!   lock (`F_OFD_SETLK` on Linux, so the lock belongs to the open file
//!   rather than the whole process). Such locks are advisory and are not
//!   reliably honored by every network filesystem; treat them as best-effort.
//! - [`MemoryFile`]: an in-process stand-in. Test builds add fault injection
//!   to exercise contention and torn writes deterministically.

mod disk;
mod memory;

pub use crate::clock::FileTimes;
pub use disk::DiskFile;
pub use memory::MemoryFile;

use std::io;
use std::path::Path;

/// Outcome of a non-blocking range lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeLock {
    Acquired,
    /// Somebody else holds an overlapping lock. Try again later.
    Busy,
}

/// What the lock protocol needs from the shared file.
pub trait SharedFile: Sized {
    /// Open `path`, creating it if absent. The flag is true when this call
    /// created the file (and therefore owes it a header).
    fn open_or_create(path: &Path) -> io::Result<(Self, bool)>;

    /// Delete `path` if possible. `Ok(false)` means it did not exist.
    fn try_delete(path: &Path) -> io::Result<bool>;

    fn len(&self) -> io::Result<u64>;

    /// Try once to take an exclusive lock on `[offset, offset + len)`.
    fn lock_range(&mut self, offset: u64, len: u64) -> io::Result<RangeLock>;

    fn unlock_range(&mut self, offset: u64, len: u64) -> io::Result<()>;

    /// Read up to `buf.len()` bytes at `offset`. A short count means EOF.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `buf` at `offset`, growing the file if needed.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()>;

    /// Grow the file to `len` bytes, zero-filled. Never shrinks it and
    /// never touches existing bytes.
    fn extend_to(&mut self, len: u64) -> io::Result<()>;

    fn timestamps(&self) -> io::Result<FileTimes>;

    /// Let every local user read and write the file. Idempotent.
    fn set_world_accessible(&mut self) -> io::Result<()>;
}
