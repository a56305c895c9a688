//! This module contains utility and helper functions for this crate.

use alloy_primitives::{keccak256, B256, B512};

pub mod ser;

/// Concatenate two fixed sized arrays together into a new array with minimal reallocation.
#[inline(always)]
pub(crate) fn concat_fixed(a: B256, b: B256) -> B512 {
    let mut concatenated = B512::ZERO;
    let (left, right) = concatenated.split_at_mut(32);
    left.copy_from_slice(a.as_ref());
    right.copy_from_slice(b.as_ref());
    concatenated
}

/// Hash the concatenation of two 32 byte digests. This is the pairwise node hash of the memory
/// tree, and must match the on-chain verifier exactly: `keccak256(left ++ right)`.
#[inline(always)]
pub fn keccak_concat_hashes(a: B256, b: B256) -> B256 {
    #[cfg(any(test, feature = "test-utils"))]
    crate::test_utils::record_hash();

    keccak256(concat_fixed(a, b).as_slice())
}

/// Returns a human-readable string describing `total` bytes in B, KiB, MiB, GiB, TiB, PiB, or
/// EiB.
pub(crate) fn human_bytes(total: u64) -> String {
    const UNIT: u64 = 1024;
    if total < UNIT {
        return format!("{} B", total);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = total / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}iB", (total as f64) / (div as f64), ['K', 'M', 'G', 'T', 'P', 'E'][exp])
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy_primitives::b256;

    #[test]
    fn concat_hash_matches_keccak_of_concatenation() {
        let a = b256!("0101010101010101010101010101010101010101010101010101010101010101");
        let b = b256!("0202020202020202020202020202020202020202020202020202020202020202");
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(a.as_slice());
        buf.extend_from_slice(b.as_slice());
        assert_eq!(keccak_concat_hashes(a, b), keccak256(&buf));
        assert_ne!(keccak_concat_hashes(a, b), keccak_concat_hashes(b, a), "order matters");
    }

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(4096), "4.0 KiB");
        assert_eq!(human_bytes(3 * 1024 * 1024 / 2), "1.5 MiB");
        assert_eq!(human_bytes(1 << 30), "1.0 GiB");
    }
}
