//! Payload compression codec
//!
//! The codec is split along a capability boundary: the hot path (agent,
//! quarantine, hound dispatch) holds a `PayloadCodec` and can only encode;
//! the cold path (forensic retention and analysis tooling) holds a
//! `ForensicCodec` and may also decode. Both a blocking and a cooperative
//! flavor exist and produce byte-identical output for the same input.

use crate::error::{TracehoundError, TracehoundResult};
use crate::hashing::{constant_time_eq_str, sha256_hex};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Compressed payload with integrity metadata, ready for cold storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedPayload {
    /// gzip-compressed bytes
    pub compressed: Vec<u8>,
    /// Hex SHA-256 of the compressed bytes
    pub hash: String,
    /// Uncompressed length
    pub original_size: u32,
    /// Compressed length; always > 0 (the gzip header alone is non-empty)
    pub compressed_size: u32,
}

/// Hot-path capability: encode only
pub trait PayloadCodec {
    fn encode(&self, bytes: &[u8]) -> TracehoundResult<Vec<u8>>;
}

/// Cold-path capability: encode and decode
pub trait ForensicCodec: PayloadCodec {
    fn decode(&self, bytes: &[u8]) -> TracehoundResult<Vec<u8>>;

    /// Decode an encoded payload, checking integrity first
    fn decode_with_integrity(&self, payload: &EncodedPayload) -> TracehoundResult<Vec<u8>> {
        if !verify(payload) {
            return Err(TracehoundError::CodecIntegrityFailed(
                "encoded payload hash mismatch".to_string(),
            ));
        }
        self.decode(&payload.compressed)
    }
}

/// Compress and wrap with integrity metadata
pub fn encode_with_integrity<C: PayloadCodec + ?Sized>(
    codec: &C,
    bytes: &[u8],
) -> TracehoundResult<EncodedPayload> {
    let compressed = codec.encode(bytes)?;
    let hash = sha256_hex(&compressed);
    Ok(EncodedPayload {
        hash,
        original_size: bytes.len() as u32,
        compressed_size: compressed.len() as u32,
        compressed,
    })
}

/// Recompute the hash of the compressed bytes and compare constant-time
pub fn verify(payload: &EncodedPayload) -> bool {
    if payload.compressed.len() != payload.compressed_size as usize {
        return false;
    }
    constant_time_eq_str(&sha256_hex(&payload.compressed), &payload.hash)
}

/// Blocking gzip codec
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec;

impl GzipCodec {
    pub fn new() -> Self {
        Self
    }

    /// Compress and wrap with integrity metadata
    pub fn encode_with_integrity(&self, bytes: &[u8]) -> TracehoundResult<EncodedPayload> {
        encode_with_integrity(self, bytes)
    }
}

impl PayloadCodec for GzipCodec {
    fn encode(&self, bytes: &[u8]) -> TracehoundResult<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(bytes)
            .map_err(|e| TracehoundError::CodecEncodeFailed(format!("gzip encode: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| TracehoundError::CodecEncodeFailed(format!("gzip finish: {}", e)))
    }
}

impl ForensicCodec for GzipCodec {
    fn decode(&self, bytes: &[u8]) -> TracehoundResult<Vec<u8>> {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| TracehoundError::CodecDecodeFailed(format!("gzip decode: {}", e)))?;
        Ok(out)
    }
}

/// Cooperative hot-path capability
#[async_trait]
pub trait AsyncPayloadCodec: Send + Sync {
    async fn encode(&self, bytes: Vec<u8>) -> TracehoundResult<Vec<u8>>;
}

/// Cooperative cold-path capability
#[async_trait]
pub trait AsyncForensicCodec: AsyncPayloadCodec {
    async fn decode(&self, bytes: Vec<u8>) -> TracehoundResult<Vec<u8>>;
}

/// Cooperative gzip codec; delegates to the blocking routine off the
/// async executor so output is byte-identical to `GzipCodec`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioGzipCodec {
    inner: GzipCodec,
}

impl TokioGzipCodec {
    pub fn new() -> Self {
        Self { inner: GzipCodec }
    }

    /// Compress and wrap with integrity metadata without blocking the executor
    pub async fn encode_with_integrity(&self, bytes: Vec<u8>) -> TracehoundResult<EncodedPayload> {
        let inner = self.inner;
        tokio::task::spawn_blocking(move || inner.encode_with_integrity(&bytes))
            .await
            .map_err(|e| TracehoundError::CodecEncodeFailed(format!("codec task failed: {}", e)))?
    }
}

#[async_trait]
impl AsyncPayloadCodec for TokioGzipCodec {
    async fn encode(&self, bytes: Vec<u8>) -> TracehoundResult<Vec<u8>> {
        let inner = self.inner;
        tokio::task::spawn_blocking(move || inner.encode(&bytes))
            .await
            .map_err(|e| TracehoundError::CodecEncodeFailed(format!("codec task failed: {}", e)))?
    }
}

#[async_trait]
impl AsyncForensicCodec for TokioGzipCodec {
    async fn decode(&self, bytes: Vec<u8>) -> TracehoundResult<Vec<u8>> {
        let inner = self.inner;
        tokio::task::spawn_blocking(move || inner.decode(&bytes))
            .await
            .map_err(|e| TracehoundError::CodecDecodeFailed(format!("codec task failed: {}", e)))?
    }
}
