//! Digest primitives for the signature stages.
//!
//! Exact matching uses SHA-256, MD5 and SHA-1 hex digests. Similarity
//! matching uses TLSH and ssdeep. Stored TLSH signatures are digest
//! strings, so distance is computed over the hex digests themselves:
//! nibble deltas summed, with the six header nibbles weighted.

use fuzzyhash::FuzzyHash;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tlsh2::TlshDefaultBuilder;

use crate::constants::TLSH_MIN_INPUT_BYTES;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Nibbles of checksum, length and ratio information at the digest front.
const TLSH_HEADER_NIBBLES: usize = 6;

/// Weight applied to header nibble deltas.
const TLSH_HEADER_WEIGHT: u32 = 4;

/// Shortest digest body accepted for a distance computation.
const TLSH_MIN_DIGEST_NIBBLES: usize = 8;

// ============================================================================
// EXACT DIGESTS
// ============================================================================

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ============================================================================
// SIMILARITY DIGESTS
// ============================================================================

/// TLSH digest of a buffer, `None` when the input is too small or too
/// uniform to produce one.
pub fn tlsh_digest(data: &[u8]) -> Option<String> {
    if data.len() < TLSH_MIN_INPUT_BYTES {
        return None;
    }
    let tlsh = TlshDefaultBuilder::build_from(data)?;
    Some(String::from_utf8_lossy(&tlsh.hash()).into_owned())
}

/// Distance between two TLSH digest strings, `None` when either digest is
/// malformed or the lengths differ.
pub fn tlsh_digest_distance(a: &str, b: &str) -> Option<u32> {
    let a = normalize_tlsh(a);
    let b = normalize_tlsh(b);
    if a.len() != b.len() || a.len() < TLSH_MIN_DIGEST_NIBBLES {
        return None;
    }
    let mut distance = 0u32;
    for (index, (ca, cb)) in a.chars().zip(b.chars()).enumerate() {
        let va = ca.to_digit(16)?;
        let vb = cb.to_digit(16)?;
        let delta = va.abs_diff(vb);
        distance += if index < TLSH_HEADER_NIBBLES {
            delta * TLSH_HEADER_WEIGHT
        } else {
            delta
        };
    }
    Some(distance)
}

fn normalize_tlsh(digest: &str) -> String {
    let upper = digest.trim().to_ascii_uppercase();
    match upper.strip_prefix("T1") {
        Some(rest) => rest.to_string(),
        None => upper,
    }
}

/// ssdeep digest of a buffer, `None` for empty input.
pub fn fuzzy_digest(data: &[u8]) -> Option<String> {
    if data.is_empty() {
        return None;
    }
    Some(FuzzyHash::new(data).to_string())
}

/// ssdeep similarity between two digests on the 0-100 scale, zero when the
/// digests cannot be compared.
pub fn fuzzy_similarity(a: &str, b: &str) -> u32 {
    FuzzyHash::compare(a, b).unwrap_or(0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn varied_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn test_exact_digests() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(md5_hex(b"hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(sha1_hex(b"hello"), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
    }

    #[test]
    fn test_tlsh_requires_minimum_input() {
        assert!(tlsh_digest(&varied_bytes(64)).is_none());
        let digest = tlsh_digest(&varied_bytes(1024)).unwrap();
        assert!(!digest.is_empty());
    }

    #[test]
    fn test_tlsh_distance_identical_is_zero() {
        let digest = tlsh_digest(&varied_bytes(1024)).unwrap();
        assert_eq!(tlsh_digest_distance(&digest, &digest), Some(0));
    }

    #[test]
    fn test_tlsh_distance_weights_header() {
        let base = "T1AAAAAA00000000";
        assert_eq!(tlsh_digest_distance(base, "T1AAAAAA00000001"), Some(1));
        assert_eq!(tlsh_digest_distance(base, "T1AAAAAB00000000"), Some(4));
        assert_eq!(tlsh_digest_distance(base, base), Some(0));
    }

    #[test]
    fn test_tlsh_distance_rejects_malformed() {
        assert!(tlsh_digest_distance("T1AAAAAA0000000Z", "T1AAAAAA00000000").is_none());
        assert!(tlsh_digest_distance("T1AAAA", "T1AAAAAA00000000").is_none());
        assert!(tlsh_digest_distance("", "").is_none());
    }

    #[test]
    fn test_fuzzy_digest_and_self_similarity() {
        assert!(fuzzy_digest(b"").is_none());
        let digest = fuzzy_digest(&varied_bytes(4096)).unwrap();
        assert_eq!(fuzzy_similarity(&digest, &digest), 100);
    }

    #[test]
    fn test_fuzzy_similarity_rejects_garbage() {
        assert_eq!(fuzzy_similarity("not a digest", "also not one"), 0);
    }
}
