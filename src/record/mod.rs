//! Fixed-size lock records.
//!
//! A lock file is a header record followed by slot records, each exactly
//! [`RECORD_SIZE`] bytes. Every participant, on every machine, must agree on
//! this layout:
//!
//! | offset | size | field        |
//! |--------|------|--------------|
//! | 0      | 4    | checksum     |
//! | 4      | 4    | process id   |
//! | 8      | 8    | touch        |
//! | 16     | 16   | id (uuid)    |
//! | 32     | 32   | user         |
//! | 64     | 32   | lock type    |
//! | 96     | 8    | machine id   |
//! | 104    | 24   | reserved     |
//!
//! Integers are little-endian. The checksum is Adler-32 over bytes 4..128.

mod checksum;
mod layout;

#[cfg(test)]
mod tests;

pub use checksum::adler32;
pub use layout::{
    HEADER_CHECKSUM, HEADER_PROCESS_ID, LOCK_TYPE_BYTES, LockRecord, RECORD_SIZE, USER_BYTES,
    slot_offset,
};
