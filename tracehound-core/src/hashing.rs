//! SHA-256 hashing, constant-time comparison, and signature derivation

use crate::scent::ThreatCategory;
use ring::constant_time;
use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest
pub const HASH_HEX_LEN: usize = 64;

/// Hex-encoded SHA-256 digest of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Constant-time equality over byte slices
///
/// Unequal lengths short-circuit; length is assumed known to the attacker.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    constant_time::verify_slices_are_equal(a, b).is_ok()
}

/// Constant-time equality over strings
pub fn constant_time_eq_str(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}

/// Build a deduplication signature: `<category>:<hex-sha256-of-canonical-bytes>`
pub fn generate_signature(category: ThreatCategory, canonical_bytes: &[u8]) -> String {
    format!("{}:{}", category.as_str(), sha256_hex(canonical_bytes))
}

/// Check the `^[^:]+:[0-9a-f]{64}$` signature shape with a non-empty category
pub fn is_valid_signature(signature: &str) -> bool {
    match signature.split_once(':') {
        Some((category, digest)) => {
            !category.is_empty()
                && digest.len() == HASH_HEX_LEN
                && digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        }
        None => false,
    }
}
