//! Evidence handle: single-use owner of captured bytes
//!
//! An evidence handle owns the canonical payload bytes of a quarantined
//! scent. Exactly one consuming operation (`transfer`, `neutralize`,
//! `evacuate`) may succeed over its lifetime; the buffer moves out of the
//! handle and every later access fails with `EVIDENCE_DISPOSED`.

use crate::error::{TracehoundError, TracehoundResult};
use crate::hashing::{constant_time_eq_str, is_valid_signature, sha256_hex};
use crate::scent::{now_ms, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reason a quarantined evidence was forcibly disposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurgeReason {
    Timeout,
    Error,
    Abort,
    Panic,
}

impl fmt::Display for PurgeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PurgeReason::Timeout => "timeout",
            PurgeReason::Error => "error",
            PurgeReason::Abort => "abort",
            PurgeReason::Panic => "panic",
        };
        f.write_str(s)
    }
}

/// Snapshot captured atomically when evidence is neutralized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeutralizationRecord {
    pub id: String,
    pub signature: String,
    pub hash: String,
    pub size: usize,
    pub timestamp: u64,
    pub status: String,
    #[serde(rename = "previousHash")]
    pub previous_hash: String,
}

/// Record of a forced disposal; purges carry no audit chain linkage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeRecord {
    pub id: String,
    pub signature: String,
    pub hash: String,
    pub size: usize,
    pub timestamp: u64,
    pub reason: PurgeReason,
    /// Originating scent source, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Record of an evacuation to cold storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvacuationRecord {
    pub id: String,
    pub signature: String,
    pub hash: String,
    pub size: usize,
    pub timestamp: u64,
    pub destination: String,
}

/// Cheap cloneable view of an evidence handle's metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub signature: String,
    pub hash: String,
    pub severity: Severity,
    pub size: usize,
    pub captured: u64,
    pub source: Option<String>,
}

/// Single-use owner of captured payload bytes
#[derive(Debug)]
pub struct Evidence {
    buffer: Option<Vec<u8>>,
    signature: String,
    hash: String,
    severity: Severity,
    size: usize,
    captured: u64,
    source: Option<String>,
}

impl Evidence {
    /// Construct a handle over `bytes`, verifying the declared hash
    pub fn new(
        bytes: Vec<u8>,
        signature: impl Into<String>,
        hash: impl Into<String>,
        severity: Severity,
    ) -> TracehoundResult<Self> {
        let signature = signature.into();
        let hash = hash.into();
        if bytes.is_empty() {
            return Err(TracehoundError::EvidenceEmpty);
        }
        if !is_valid_signature(&signature) {
            return Err(TracehoundError::InvalidSignature(signature));
        }
        if !constant_time_eq_str(&sha256_hex(&bytes), &hash) {
            return Err(TracehoundError::EvidenceHashMismatch(format!(
                "declared hash does not match buffer for {}",
                signature
            )));
        }
        let size = bytes.len();
        Ok(Self {
            buffer: Some(bytes),
            signature,
            hash,
            severity,
            size,
            captured: now_ms(),
            source: None,
        })
    }

    /// Annotate with the originating scent source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Override the capture timestamp
    pub fn with_captured(mut self, captured: u64) -> Self {
        self.captured = captured;
        self
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn captured(&self) -> u64 {
        self.captured
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Whether a consuming operation has already run
    pub fn disposed(&self) -> bool {
        self.buffer.is_none()
    }

    /// Borrow the owned bytes; fails once disposed
    pub fn bytes(&self) -> TracehoundResult<&[u8]> {
        self.buffer
            .as_deref()
            .ok_or_else(|| TracehoundError::EvidenceDisposed(self.signature.clone()))
    }

    /// Metadata snapshot for results and events
    pub fn summary(&self) -> EvidenceSummary {
        EvidenceSummary {
            signature: self.signature.clone(),
            hash: self.hash.clone(),
            severity: self.severity,
            size: self.size,
            captured: self.captured,
            source: self.source.clone(),
        }
    }

    /// Consume the handle, releasing the buffer outward
    pub fn transfer(&mut self) -> TracehoundResult<Vec<u8>> {
        self.take_buffer()
    }

    /// Consume the handle, producing a chained neutralization record
    ///
    /// The metadata snapshot and the buffer release happen in one step;
    /// there is no window in which the record exists while the bytes
    /// remain readable.
    pub fn neutralize(&mut self, previous_hash: &str) -> TracehoundResult<NeutralizationRecord> {
        let buffer = self.take_buffer()?;
        let record = NeutralizationRecord {
            id: new_record_id(),
            signature: self.signature.clone(),
            hash: self.hash.clone(),
            size: buffer.len(),
            timestamp: now_ms(),
            status: "neutralized".to_string(),
            previous_hash: previous_hash.to_string(),
        };
        drop(buffer);
        Ok(record)
    }

    /// Consume the handle for cold-storage dispatch
    pub fn evacuate(&mut self, destination: &str) -> TracehoundResult<(EvacuationRecord, Vec<u8>)> {
        let buffer = self.take_buffer()?;
        let record = EvacuationRecord {
            id: new_record_id(),
            signature: self.signature.clone(),
            hash: self.hash.clone(),
            size: buffer.len(),
            timestamp: now_ms(),
            destination: destination.to_string(),
        };
        Ok((record, buffer))
    }

    /// Forcibly dispose the handle, documenting the reason
    pub fn purge(&mut self, reason: PurgeReason) -> TracehoundResult<PurgeRecord> {
        let buffer = self.take_buffer()?;
        let record = PurgeRecord {
            id: new_record_id(),
            signature: self.signature.clone(),
            hash: self.hash.clone(),
            size: buffer.len(),
            timestamp: now_ms(),
            reason,
            source: self.source.clone(),
        };
        drop(buffer);
        Ok(record)
    }

    fn take_buffer(&mut self) -> TracehoundResult<Vec<u8>> {
        self.buffer
            .take()
            .ok_or_else(|| TracehoundError::EvidenceDisposed(self.signature.clone()))
    }
}

/// Generate a record id: UUIDv7, time-prefixed and unique
pub fn new_record_id() -> String {
    Uuid::now_v7().to_string()
}

/// Sanity assertion for internally generated record ids
pub fn is_valid_record_id(id: &str) -> bool {
    match Uuid::parse_str(id) {
        Ok(uuid) => uuid.get_version_num() == 7,
        Err(_) => false,
    }
}
