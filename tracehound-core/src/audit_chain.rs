//! Tamper-evident audit chain
//!
//! Append-only log of neutralization records. Each record's `previousHash`
//! must equal the chain tail at append time; the tail then advances to the
//! SHA-256 of the record's canonical serialization. Mutating any field of
//! any stored record invalidates the whole chain.

use crate::canonical;
use crate::error::{TracehoundError, TracehoundResult};
use crate::evidence::NeutralizationRecord;
use crate::hashing::sha256_hex;
use tracing::debug;

/// Tail value of an empty chain
pub const GENESIS_HASH: &str = "tracehound:audit:genesis";

/// Hash-linked, append-only log of destructive acts
#[derive(Debug)]
pub struct AuditChain {
    records: Vec<NeutralizationRecord>,
    tail: String,
}

impl Default for AuditChain {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditChain {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            tail: GENESIS_HASH.to_string(),
        }
    }

    /// Current tail: the genesis sentinel, or the hash of the last record
    pub fn last_hash(&self) -> &str {
        &self.tail
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order
    pub fn records(&self) -> &[NeutralizationRecord] {
        &self.records
    }

    /// Append a record whose `previousHash` matches the current tail
    pub fn append(&mut self, record: NeutralizationRecord) -> TracehoundResult<()> {
        if record.previous_hash != self.tail {
            return Err(TracehoundError::AuditChainBroken(format!(
                "record {} links to {} but tail is {}",
                record.id, record.previous_hash, self.tail
            )));
        }
        self.tail = Self::record_hash(&record)?;
        debug!(record_id = %record.id, tail = %self.tail, "audit chain extended");
        self.records.push(record);
        Ok(())
    }

    /// Replay the chain from genesis, checking every link
    pub fn verify(&self) -> TracehoundResult<bool> {
        let mut expected = GENESIS_HASH.to_string();
        for record in &self.records {
            if record.previous_hash != expected {
                return Ok(false);
            }
            expected = Self::record_hash(record)?;
        }
        Ok(expected == self.tail)
    }

    /// SHA-256 over the record's canonical serialization
    pub fn record_hash(record: &NeutralizationRecord) -> TracehoundResult<String> {
        let value = serde_json::to_value(record).map_err(|e| {
            TracehoundError::AuditChainBroken(format!("record not serializable: {}", e))
        })?;
        let canonical = canonical::canonicalize(&value)?;
        Ok(sha256_hex(canonical.as_bytes()))
    }
}
