//! Evidence factory: build a sealed evidence handle from a scent
//!
//! Pipeline: canonical encode → hash → signature → evidence. Any failure
//! leaves no partial state behind.

use crate::canonical;
use crate::error::TracehoundResult;
use crate::evidence::Evidence;
use crate::hashing::{generate_signature, sha256_hex};
use crate::scent::{Scent, ThreatSignal};
use tracing::debug;

/// A freshly captured evidence with its derived identifiers
#[derive(Debug)]
pub struct EvidenceCapture {
    pub evidence: Evidence,
    pub signature: String,
    pub hash: String,
}

/// Builds evidence handles from scents carrying a threat signal
#[derive(Debug, Clone, Copy)]
pub struct EvidenceFactory {
    max_payload_size: usize,
}

impl EvidenceFactory {
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Encode, hash, sign and wrap a threat-carrying scent
    pub fn create(&self, scent: &Scent, threat: &ThreatSignal) -> TracehoundResult<EvidenceCapture> {
        scent.validate()?;
        let encoded = canonical::encode(&scent.payload, self.max_payload_size)?;
        let hash = sha256_hex(&encoded.bytes);
        let signature = generate_signature(threat.category, &encoded.bytes);

        let evidence = Evidence::new(encoded.bytes, signature.clone(), hash.clone(), threat.severity)?
            .with_source(scent.source.clone())
            .with_captured(scent.timestamp);

        debug!(scent_id = %scent.id, %signature, size = evidence.size(), "evidence captured");
        Ok(EvidenceCapture {
            evidence,
            signature,
            hash,
        })
    }
}
