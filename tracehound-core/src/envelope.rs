//! Cold-storage envelope
//!
//! Self-describing binary framing around a compressed payload:
//! 4 magic bytes `"THCS"`, 2-byte big-endian version, 4-byte big-endian
//! original size, 4-byte big-endian compressed size, 64 ASCII-hex SHA-256
//! of the compressed payload, then exactly `compressed_size` payload bytes.
//! All multi-byte fields are big-endian.

use crate::codec::EncodedPayload;
use crate::hashing::HASH_HEX_LEN;

/// Envelope magic: `"THCS"`
pub const ENVELOPE_MAGIC: [u8; 4] = *b"THCS";

/// Current envelope format version
pub const ENVELOPE_VERSION: u16 = 1;

/// Fixed header length: 4 + 2 + 4 + 4 + 64
pub const ENVELOPE_HEADER_LEN: usize = 78;

/// Frame an encoded payload; output is always `78 + compressed_size` bytes
pub fn pack(payload: &EncodedPayload) -> Vec<u8> {
    let mut out = Vec::with_capacity(ENVELOPE_HEADER_LEN + payload.compressed.len());
    out.extend_from_slice(&ENVELOPE_MAGIC);
    out.extend_from_slice(&ENVELOPE_VERSION.to_be_bytes());
    out.extend_from_slice(&payload.original_size.to_be_bytes());
    out.extend_from_slice(&payload.compressed_size.to_be_bytes());
    out.extend_from_slice(payload.hash.as_bytes());
    out.extend_from_slice(&payload.compressed);
    out
}

/// Parse an envelope; returns `None` on any structural deviation
///
/// The input is never mutated, and unpacking performs no integrity check:
/// callers must still `verify` the result before decoding.
pub fn unpack(bytes: &[u8]) -> Option<EncodedPayload> {
    if bytes.len() < ENVELOPE_HEADER_LEN {
        return None;
    }
    if bytes[0..4] != ENVELOPE_MAGIC {
        return None;
    }
    let version = u16::from_be_bytes([bytes[4], bytes[5]]);
    if version != ENVELOPE_VERSION {
        return None;
    }
    let original_size = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    let compressed_size = u32::from_be_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);
    if ENVELOPE_HEADER_LEN + compressed_size as usize != bytes.len() {
        return None;
    }
    if compressed_size == 0 && bytes.len() > ENVELOPE_HEADER_LEN {
        return None;
    }
    let hash = std::str::from_utf8(&bytes[14..14 + HASH_HEX_LEN]).ok()?;
    Some(EncodedPayload {
        compressed: bytes[ENVELOPE_HEADER_LEN..].to_vec(),
        hash: hash.to_string(),
        original_size,
        compressed_size,
    })
}
