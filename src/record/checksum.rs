//! Adler-32, as used by the record checksum field.

const MOD_ADLER: u32 = 65_521;

/// Largest run of bytes that can be summed before `b` could overflow a u32.
const NMAX: usize = 5552;

/// Compute the Adler-32 checksum of `data`.
pub fn adler32(data: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;

    for chunk in data.chunks(NMAX) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= MOD_ADLER;
        b %= MOD_ADLER;
    }

    (b << 16) | a
}
