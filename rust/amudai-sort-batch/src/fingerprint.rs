//! Locality fingerprint for key-value payloads.
//!
//! When a key-value table has no explicit sort fields, values are ordered by a
//! 64-bit similarity hash of their bytes instead. Each `window`-byte shingle of
//! the value is hashed with xxh3; every hash votes +1/-1 on each of the 64 output
//! bits, and an output bit is set when its vote is positive. Values sharing most
//! shingles end up with fingerprints that differ in few bits, so sorting by the
//! big-endian fingerprint tends to place similar values next to each other.

use xxhash_rust::xxh3::xxh3_64;

/// Width of the encoded fingerprint sort key.
pub const FINGERPRINT_WIDTH: usize = 8;

/// Computes the similarity hash of `value` over shingles of `window` bytes.
///
/// Values shorter than the window are hashed as a single shingle. The empty value
/// maps to zero.
pub fn locality_fingerprint(value: &[u8], window: usize) -> u64 {
    if value.is_empty() {
        return 0;
    }
    let window = window.clamp(1, value.len());
    let mut votes = [0i32; 64];
    for shingle in value.windows(window) {
        let hash = xxh3_64(shingle);
        for (bit, vote) in votes.iter_mut().enumerate() {
            if (hash >> bit) & 1 == 1 {
                *vote += 1;
            } else {
                *vote -= 1;
            }
        }
    }
    votes
        .iter()
        .enumerate()
        .filter(|(_, vote)| **vote > 0)
        .fold(0u64, |acc, (bit, _)| acc | (1u64 << bit))
}

/// Appends the fingerprint of `value` as a big-endian sort key.
pub fn encode_fingerprint(value: &[u8], window: usize, out: &mut Vec<u8>) {
    out.extend_from_slice(&locality_fingerprint(value, window).to_be_bytes());
}
