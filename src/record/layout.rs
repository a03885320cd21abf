//! LockRecord layout, encoding and field accessors.

use super::checksum::adler32;
use crate::identity::ClientIdentity;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Size of one record (header or slot) in bytes.
pub const RECORD_SIZE: usize = 128;

/// Bytes reserved for the NUL-padded user name.
pub const USER_BYTES: usize = 32;

/// Bytes reserved for the NUL-padded lock type.
pub const LOCK_TYPE_BYTES: usize = 32;

/// Header sentinels. A stamped record can never carry both, since its
/// checksum field is a real Adler-32 and its process id a real pid.
pub const HEADER_CHECKSUM: u32 = 0xB00B_D00D;
pub const HEADER_PROCESS_ID: u32 = 0xBAAD_D0D0;

/// Byte offset of slot `index` (0-based); the header occupies offset 0.
pub fn slot_offset(index: usize) -> u64 {
    ((index as u64) + 1) * RECORD_SIZE as u64
}

/// Microseconds between 1601-01-01 and 1970-01-01, UTC.
const EPOCH_1601_OFFSET_MICROS: i64 = 11_644_473_600 * 1_000_000;

/// One 128-byte record of the lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRecord {
    pub checksum: u32,
    pub process_id: u32,
    /// Last touch, in microseconds since 1601-01-01 UTC (calibrated time).
    pub touch: u64,
    pub id: [u8; 16],
    pub user: [u8; USER_BYTES],
    pub lock_type: [u8; LOCK_TYPE_BYTES],
    pub machine_id: u64,
    pub reserved: [u8; 24],
}

impl Default for LockRecord {
    fn default() -> Self {
        Self {
            checksum: 0,
            process_id: 0,
            touch: 0,
            id: [0; 16],
            user: [0; USER_BYTES],
            lock_type: [0; LOCK_TYPE_BYTES],
            machine_id: 0,
            reserved: [0; 24],
        }
    }
}

impl LockRecord {
    /// An all-zero (free) record.
    pub fn free() -> Self {
        Self::default()
    }

    /// The magic header stored at offset 0.
    pub fn header() -> Self {
        Self {
            checksum: HEADER_CHECKSUM,
            process_id: HEADER_PROCESS_ID,
            ..Self::default()
        }
    }

    /// A sealed record claiming a slot for `identity` with `lock_type`.
    pub fn stamped(identity: &ClientIdentity, lock_type: &str, touch: DateTime<Utc>) -> Self {
        let mut record = Self::free();
        record.set_id(identity.id, identity.process_id, identity.machine_id);
        record.set_user(&identity.user);
        record.set_lock_type(lock_type);
        record.set_touch_time(touch);
        record.seal();
        record
    }

    /// Decode a record from its on-disk bytes.
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let mut record = Self::free();
        record.checksum = u32::from_le_bytes(field(bytes, 0));
        record.process_id = u32::from_le_bytes(field(bytes, 4));
        record.touch = u64::from_le_bytes(field(bytes, 8));
        record.id = field(bytes, 16);
        record.user = field(bytes, 32);
        record.lock_type = field(bytes, 64);
        record.machine_id = u64::from_le_bytes(field(bytes, 96));
        record.reserved = field(bytes, 104);
        record
    }

    /// Encode the record into its on-disk bytes.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[0..4].copy_from_slice(&self.checksum.to_le_bytes());
        out[4..8].copy_from_slice(&self.process_id.to_le_bytes());
        out[8..16].copy_from_slice(&self.touch.to_le_bytes());
        out[16..32].copy_from_slice(&self.id);
        out[32..64].copy_from_slice(&self.user);
        out[64..96].copy_from_slice(&self.lock_type);
        out[96..104].copy_from_slice(&self.machine_id.to_le_bytes());
        out[104..128].copy_from_slice(&self.reserved);
        out
    }

    /// True for the magic header record.
    pub fn is_header(&self) -> bool {
        self.checksum == HEADER_CHECKSUM && self.process_id == HEADER_PROCESS_ID
    }

    /// Zero every field, returning the slot to the free state.
    pub fn reset(&mut self) {
        *self = Self::free();
    }

    /// True when nobody owns this slot.
    pub fn is_free(&self) -> bool {
        self.id.iter().all(|&b| b == 0)
    }

    /// True when the slot is claimed without a lock type.
    pub fn is_lock_empty(&self) -> bool {
        self.lock_type.iter().all(|&b| b == 0)
    }

    pub fn compute_checksum(&self) -> u32 {
        adler32(&self.to_bytes()[4..])
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Force the last byte of each string field to NUL.
    pub fn terminate_strings(&mut self) {
        self.user[USER_BYTES - 1] = 0;
        self.lock_type[LOCK_TYPE_BYTES - 1] = 0;
    }

    /// Terminate strings and recompute the checksum.
    pub fn seal(&mut self) {
        self.terminate_strings();
        self.checksum = self.compute_checksum();
        debug_assert!(self.verify_checksum());
    }

    pub fn id(&self) -> Uuid {
        Uuid::from_bytes(self.id)
    }

    pub fn set_id(&mut self, id: Uuid, process_id: u32, machine_id: u64) {
        self.id = *id.as_bytes();
        self.process_id = process_id;
        self.machine_id = machine_id;
    }

    pub fn user(&self) -> String {
        nul_terminated(&self.user)
    }

    pub fn set_user(&mut self, user: &str) {
        self.user = padded(user);
    }

    pub fn lock_type(&self) -> String {
        nul_terminated(&self.lock_type)
    }

    /// Replace the lock type. Anything past 31 bytes is dropped.
    pub fn set_lock_type(&mut self, lock_type: &str) {
        self.lock_type = padded(lock_type);
    }

    pub fn touch_time(&self) -> DateTime<Utc> {
        from_micros_1601(self.touch)
    }

    pub fn set_touch_time(&mut self, time: DateTime<Utc>) {
        self.touch = to_micros_1601(time);
    }
}

fn field<const N: usize>(bytes: &[u8; RECORD_SIZE], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

fn padded<const N: usize>(value: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let len = value.len().min(N - 1);
    out[..len].copy_from_slice(&value.as_bytes()[..len]);
    out
}

fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Convert a UTC time to microseconds since 1601. Times before 1601 clamp to 0.
pub(crate) fn to_micros_1601(time: DateTime<Utc>) -> u64 {
    let micros = time.timestamp_micros().saturating_add(EPOCH_1601_OFFSET_MICROS);
    u64::try_from(micros).unwrap_or(0)
}

pub(crate) fn from_micros_1601(micros: u64) -> DateTime<Utc> {
    let unix_micros = i64::try_from(micros)
        .unwrap_or(i64::MAX)
        .saturating_sub(EPOCH_1601_OFFSET_MICROS);
    DateTime::from_timestamp_micros(unix_micros).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
