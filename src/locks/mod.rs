//! Advisory locks shared through a single lock file.
//!
//! Every participant opens the same file and claims one 128-byte slot in
//! it, advertising a short lock type ("read", "write", ...). What the types
//! mean, and which combinations conflict, is up to the application; this
//! module only guarantees a consistent view of who holds what.
//!
//! # Mutual exclusion
//!
//! Reads and writes of the file happen under an exclusive byte-range lock on
//! its first megabyte. Acquisition is non-blocking and retried according to
//! the session's `RetryPolicy`. Because range locks are not honored
//! everywhere, every slot also carries an Adler-32 checksum: a torn record
//! makes the reader drop the range lock and read again.
//!
//! # Reclamation
//!
//! On each fresh acquire, slots are reclaimed from
//! - processes on this machine, for this user, that no longer run;
//! - participants that have not touched their slot for
//!   `expire_time_seconds` of calibrated time.
//!
//! # Slot allocation
//!
//! A new participant picks a free slot uniformly at random among at least
//! `entropy_n` candidates, growing the file if needed. Two writers racing on
//! a filesystem without working range locks are then unlikely to pick the
//! same slot.

mod acquire;
mod guard;
mod maintenance;
mod operations;
mod session;
mod store;
mod types;


// Re-export public API
pub use acquire::LOCK_REGION_SIZE;
pub use guard::SessionHold;
pub use session::LockSession;
pub use types::LockEntry;
