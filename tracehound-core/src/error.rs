//! Error types for the Tracehound intercept core

use thiserror::Error;

/// Errors that can occur in the intercept pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TracehoundError {
    /// Payload contains a value the canonical encoder rejects
    #[error("Scent payload invalid: {0}")]
    ScentPayloadInvalid(String),

    /// Scent arrived without a source identifier
    #[error("Scent source missing: {0}")]
    ScentSourceMissing(String),

    /// Canonical payload exceeds the configured byte limit
    #[error("Payload too large: {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Unexpected internal failure during intercept
    #[error("Intercept failed: {0}")]
    InterceptFailed(String),

    /// Quarantine cannot accept the evidence
    #[error("Quarantine full: {0}")]
    QuarantineFull(String),

    /// Eviction could not free capacity
    #[error("Quarantine eviction failed: {0}")]
    QuarantineEvictFailed(String),

    /// Consuming operation on an already-consumed evidence handle
    #[error("Evidence disposed: {0}")]
    EvidenceDisposed(String),

    /// Evidence buffer does not match its declared hash
    #[error("Evidence hash mismatch: {0}")]
    EvidenceHashMismatch(String),

    /// Evidence constructed over an empty buffer
    #[error("Evidence buffer is empty")]
    EvidenceEmpty,

    /// Signature string does not match the category:sha256 shape
    #[error("Invalid signature format: {0}")]
    InvalidSignature(String),

    /// Compression failed
    #[error("Codec encode failed: {0}")]
    CodecEncodeFailed(String),

    /// Decompression failed on a corrupt stream
    #[error("Codec decode failed: {0}")]
    CodecDecodeFailed(String),

    /// Encoded payload failed its integrity check
    #[error("Codec integrity check failed: {0}")]
    CodecIntegrityFailed(String),

    /// Audit chain link validation failed
    #[error("Audit chain broken: {0}")]
    AuditChainBroken(String),

    /// Request rejected by the per-source rate limiter
    #[error("Rate limited: retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    /// Configuration validation failed at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TracehoundError {
    /// Stable wire code for the error, grouped by domain
    pub fn code(&self) -> &'static str {
        match self {
            TracehoundError::ScentPayloadInvalid(_) => "SCENT_PAYLOAD_INVALID",
            TracehoundError::ScentSourceMissing(_) => "SCENT_SOURCE_MISSING",
            TracehoundError::PayloadTooLarge { .. } => "AGENT_PAYLOAD_TOO_LARGE",
            TracehoundError::InterceptFailed(_) => "AGENT_INTERCEPT_FAILED",
            TracehoundError::QuarantineFull(_) => "QUARANTINE_FULL",
            TracehoundError::QuarantineEvictFailed(_) => "QUARANTINE_EVICT_FAILED",
            TracehoundError::EvidenceDisposed(_) => "EVIDENCE_DISPOSED",
            TracehoundError::EvidenceHashMismatch(_) => "EVIDENCE_HASH_MISMATCH",
            TracehoundError::EvidenceEmpty => "EVIDENCE_EMPTY",
            TracehoundError::InvalidSignature(_) => "SIGNATURE_INVALID",
            TracehoundError::CodecEncodeFailed(_) => "CODEC_ENCODE_FAILED",
            TracehoundError::CodecDecodeFailed(_) => "CODEC_DECODE_FAILED",
            TracehoundError::CodecIntegrityFailed(_) => "CODEC_INTEGRITY_FAILED",
            TracehoundError::AuditChainBroken(_) => "AUDIT_CHAIN_BROKEN",
            TracehoundError::RateLimited { .. } => "RATE_LIMITED",
            TracehoundError::InvalidConfig(_) => "CONFIG_INVALID",
        }
    }

    /// Whether the caller may retry the operation that produced this error
    pub fn recoverable(&self) -> bool {
        matches!(self, TracehoundError::RateLimited { .. })
    }
}

/// Result type for Tracehound core operations
pub type TracehoundResult<T> = Result<T, TracehoundError>;
