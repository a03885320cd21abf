//! Tests for the record layout.

use super::*;
use crate::identity::ClientIdentity;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use uuid::Uuid;

fn identity() -> ClientIdentity {
    ClientIdentity::new(Uuid::new_v4(), "alice@build-01", 4242, 0x1122_3344_5566_7788)
}

#[test]
fn test_adler32_known_vectors() {
    assert_eq!(adler32(b""), 1);
    assert_eq!(adler32(b"a"), 0x0062_0062);
    assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
}

#[test]
fn test_adler32_long_input_matches_naive() {
    let data: Vec<u8> = (0..20_000u32).map(|i| (i * 7 + 3) as u8).collect();
    let (mut a, mut b) = (1u64, 0u64);
    for &byte in &data {
        a = (a + u64::from(byte)) % 65_521;
        b = (b + a) % 65_521;
    }
    assert_eq!(adler32(&data), ((b << 16) | a) as u32);
}

#[test]
fn test_header_sentinels() {
    let header = LockRecord::header();
    assert!(header.is_header());
    assert!(header.is_free());

    let bytes = header.to_bytes();
    assert_eq!(&bytes[0..4], &0xB00B_D00Du32.to_le_bytes());
    assert_eq!(&bytes[4..8], &0xBAAD_D0D0u32.to_le_bytes());
    assert!(bytes[8..].iter().all(|&b| b == 0));
}

#[test]
fn test_stamped_record_fields() {
    let ident = identity();
    let touch = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let record = LockRecord::stamped(&ident, "write", touch);

    assert!(record.verify_checksum());
    assert!(!record.is_free());
    assert!(!record.is_header());
    assert_eq!(record.id(), ident.id);
    assert_eq!(record.user(), "alice@build-01");
    assert_eq!(record.lock_type(), "write");
    assert_eq!(record.process_id, 4242);
    assert_eq!(record.machine_id, 0x1122_3344_5566_7788);
    assert_eq!(record.touch_time(), touch);
}

#[test]
fn test_byte_layout_offsets() {
    let ident = identity();
    let record = LockRecord::stamped(&ident, "read", Utc::now());
    let bytes = record.to_bytes();

    assert_eq!(bytes.len(), RECORD_SIZE);
    assert_eq!(&bytes[4..8], &4242u32.to_le_bytes());
    assert_eq!(&bytes[16..32], ident.id.as_bytes());
    assert_eq!(&bytes[32..46], b"alice@build-01");
    assert_eq!(&bytes[64..68], b"read");
    assert_eq!(&bytes[96..104], &0x1122_3344_5566_7788u64.to_le_bytes());
    assert_eq!(adler32(&bytes[4..]), record.checksum);
}

#[test]
fn test_decode_matches_encode() {
    let record = LockRecord::stamped(&identity(), "exclusive", Utc::now());
    assert_eq!(LockRecord::from_bytes(&record.to_bytes()), record);
}

#[test]
fn test_touch_epoch_is_1601() {
    let mut record = LockRecord::free();
    let unix_epoch = Utc.timestamp_opt(0, 0).unwrap();
    record.set_touch_time(unix_epoch);
    assert_eq!(record.touch, 11_644_473_600 * 1_000_000);
    assert_eq!(record.touch_time(), unix_epoch);
}

#[test]
fn test_strings_are_truncated_and_terminated() {
    let mut record = LockRecord::free();
    record.set_lock_type(&"x".repeat(40));
    assert_eq!(record.lock_type().len(), LOCK_TYPE_BYTES - 1);

    record.user = [b'u'; USER_BYTES];
    record.terminate_strings();
    assert_eq!(record.user().len(), USER_BYTES - 1);
}

#[test]
fn test_set_lock_type_clears_previous_value() {
    let mut record = LockRecord::free();
    record.set_lock_type("exclusive");
    record.set_lock_type("rw");
    assert_eq!(record.lock_type(), "rw");

    record.set_lock_type("");
    assert!(record.is_lock_empty());
}

#[test]
fn test_reset_frees_slot() {
    let mut record = LockRecord::stamped(&identity(), "write", Utc::now());
    record.reset();
    assert!(record.is_free());
    assert!(record.is_lock_empty());
    assert_eq!(record, LockRecord::free());
    // A zeroed slot does not carry a valid checksum.
    assert!(!record.verify_checksum());
}

proptest! {
    #[test]
    fn any_single_bit_flip_breaks_checksum(bit in 32usize..(RECORD_SIZE * 8)) {
        let record = LockRecord::stamped(&identity(), "write", Utc::now());
        let mut bytes = record.to_bytes();
        bytes[bit / 8] ^= 1 << (bit % 8);

        let torn = LockRecord::from_bytes(&bytes);
        prop_assert!(!torn.verify_checksum());
    }
}
