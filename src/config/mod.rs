//! Configuration model for slotlock.
//!
//! `LockConfig` holds the tunables of a lock session: slot entropy, lock
//! expiry, dead-process detection, the delete-on-open policy and the retry
//! policy used while waiting for the byte-range lock. It can be built in code
//! or loaded from YAML (unknown fields are ignored, missing fields take their
//! defaults).

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::LockConfig;
pub use types::RetryPolicy;
