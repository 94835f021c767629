//! Quarantine: signature-indexed evidence store with priority eviction
//!
//! Holds at most `max_count` evidences totalling at most `max_bytes`.
//! When either cap is crossed the store evicts one victim at a time,
//! ascending by (severity rank, capture time), until both caps hold.
//! Every eviction and every explicit neutralization appends to the audit
//! chain; purges document forced disposal without chain linkage.

use crate::audit_chain::AuditChain;
use crate::config::QuarantineConfig;
use crate::error::{TracehoundError, TracehoundResult};
use crate::evidence::{
    EvacuationRecord, Evidence, EvidenceSummary, NeutralizationRecord, PurgeReason, PurgeRecord,
};
use crate::scent::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Outcome of a quarantine insert
#[derive(Debug)]
pub enum InsertOutcome {
    /// Stored; any evictions forced by the caps are reported
    Inserted { evicted: Vec<NeutralizationRecord> },
    /// Signature already present; the store is unchanged and the
    /// un-inserted evidence is handed back to the caller
    Duplicate {
        existing: EvidenceSummary,
        rejected: Evidence,
    },
}

/// Outcome of an atomic replace
#[derive(Debug)]
pub struct ReplaceOutcome {
    /// Record for the old entry, when one was present
    pub neutralized: Option<NeutralizationRecord>,
    pub insert: InsertOutcome,
}

/// Point-in-time quarantine statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineStats {
    pub count: usize,
    pub bytes: u64,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
    pub total_evictions: u64,
    pub total_neutralizations: u64,
}

/// Signature-indexed store with priority+age eviction
#[derive(Debug)]
pub struct Quarantine {
    config: QuarantineConfig,
    store: BTreeMap<String, Evidence>,
    bytes: u64,
    audit: Arc<Mutex<AuditChain>>,
    total_evictions: u64,
    total_neutralizations: u64,
}

impl Quarantine {
    pub fn new(config: QuarantineConfig, audit: Arc<Mutex<AuditChain>>) -> Self {
        Self {
            config,
            store: BTreeMap::new(),
            bytes: 0,
            audit,
            total_evictions: 0,
            total_neutralizations: 0,
        }
    }

    /// Create with a fresh audit chain
    pub fn with_config(config: QuarantineConfig) -> Self {
        Self::new(config, Arc::new(Mutex::new(AuditChain::new())))
    }

    pub fn count(&self) -> usize {
        self.store.len()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn has(&self, signature: &str) -> bool {
        self.store.contains_key(signature)
    }

    pub fn get(&self, signature: &str) -> Option<&Evidence> {
        self.store.get(signature)
    }

    /// Shared handle to the audit chain for external verification
    pub fn audit_chain(&self) -> Arc<Mutex<AuditChain>> {
        Arc::clone(&self.audit)
    }

    /// Store evidence unless its signature is already present, then evict
    /// until both caps hold
    pub fn insert(&mut self, evidence: Evidence) -> TracehoundResult<InsertOutcome> {
        let signature = evidence.signature().to_string();
        if let Some(existing) = self.store.get(&signature) {
            debug!(%signature, "duplicate signature, store unchanged");
            return Ok(InsertOutcome::Duplicate {
                existing: existing.summary(),
                rejected: evidence,
            });
        }

        self.bytes += evidence.size() as u64;
        self.store.insert(signature.clone(), evidence);
        debug!(%signature, count = self.store.len(), bytes = self.bytes, "evidence quarantined");

        let mut evicted = Vec::new();
        while self.store.len() > self.config.max_count || self.bytes > self.config.max_bytes {
            match self.evict_one()? {
                Some(record) => evicted.push(record),
                None => {
                    return Err(TracehoundError::QuarantineEvictFailed(
                        "capacity exceeded with nothing to evict".to_string(),
                    ))
                }
            }
        }
        Ok(InsertOutcome::Inserted { evicted })
    }

    /// Neutralize a stored evidence through the audit chain
    pub fn neutralize(&mut self, signature: &str) -> TracehoundResult<Option<NeutralizationRecord>> {
        let mut evidence = match self.store.remove(signature) {
            Some(evidence) => evidence,
            None => return Ok(None),
        };
        self.bytes -= evidence.size() as u64;
        let record = self.neutralize_evidence(&mut evidence)?;
        Ok(Some(record))
    }

    /// Run the audit chain protocol over an evidence the store does not hold
    ///
    /// Used for eviction victims, flushes, and duplicate captures that were
    /// never inserted.
    pub fn neutralize_evidence(
        &mut self,
        evidence: &mut Evidence,
    ) -> TracehoundResult<NeutralizationRecord> {
        let mut chain = self.chain_lock()?;
        let tail = chain.last_hash().to_string();
        let record = evidence.neutralize(&tail)?;
        chain.append(record.clone())?;
        drop(chain);
        self.total_neutralizations += 1;
        Ok(record)
    }

    /// Neutralize every entry, in signature order
    pub fn flush(&mut self) -> TracehoundResult<Vec<NeutralizationRecord>> {
        let signatures: Vec<String> = self.store.keys().cloned().collect();
        let mut records = Vec::with_capacity(signatures.len());
        for signature in signatures {
            if let Some(record) = self.neutralize(&signature)? {
                records.push(record);
            }
        }
        debug!(flushed = records.len(), "quarantine flushed");
        Ok(records)
    }

    /// Remove and dispose an entry without audit chain linkage
    pub fn purge(
        &mut self,
        signature: &str,
        reason: PurgeReason,
    ) -> TracehoundResult<Option<PurgeRecord>> {
        let mut evidence = match self.store.remove(signature) {
            Some(evidence) => evidence,
            None => return Ok(None),
        };
        self.bytes -= evidence.size() as u64;
        let record = evidence.purge(reason)?;
        warn!(%signature, reason = %record.reason, "evidence purged");
        Ok(Some(record))
    }

    /// Remove an entry for cold-storage dispatch, releasing its bytes
    ///
    /// Evacuations document the destination but, like purges, do not link
    /// into the audit chain.
    pub fn evacuate(
        &mut self,
        signature: &str,
        destination: &str,
    ) -> TracehoundResult<Option<(EvacuationRecord, Vec<u8>)>> {
        let mut evidence = match self.store.remove(signature) {
            Some(evidence) => evidence,
            None => return Ok(None),
        };
        self.bytes -= evidence.size() as u64;
        let (record, bytes) = evidence.evacuate(destination)?;
        debug!(%signature, destination, "evidence evacuated");
        Ok(Some((record, bytes)))
    }

    /// Atomically neutralize `old_signature` (when present) and insert
    /// the replacement
    pub fn replace(
        &mut self,
        old_signature: &str,
        evidence: Evidence,
    ) -> TracehoundResult<ReplaceOutcome> {
        let neutralized = self.neutralize(old_signature)?;
        let insert = self.insert(evidence)?;
        Ok(ReplaceOutcome { neutralized, insert })
    }

    pub fn stats(&self) -> QuarantineStats {
        let mut by_rank = [0usize; 4];
        for evidence in self.store.values() {
            by_rank[evidence.severity().rank() as usize] += 1;
        }
        QuarantineStats {
            count: self.store.len(),
            bytes: self.bytes,
            low: by_rank[Severity::Low.rank() as usize],
            medium: by_rank[Severity::Medium.rank() as usize],
            high: by_rank[Severity::High.rank() as usize],
            critical: by_rank[Severity::Critical.rank() as usize],
            total_evictions: self.total_evictions,
            total_neutralizations: self.total_neutralizations,
        }
    }

    /// Evict the single lowest-priority entry: ascending by severity rank,
    /// then capture time, then signature for a deterministic tiebreak
    fn evict_one(&mut self) -> TracehoundResult<Option<NeutralizationRecord>> {
        let victim = self
            .store
            .iter()
            .min_by_key(|(signature, evidence)| {
                (evidence.severity().rank(), evidence.captured(), signature.to_string())
            })
            .map(|(signature, _)| signature.clone());

        let signature = match victim {
            Some(signature) => signature,
            None => return Ok(None),
        };

        let mut evidence = match self.store.remove(&signature) {
            Some(evidence) => evidence,
            None => return Ok(None),
        };
        self.bytes -= evidence.size() as u64;
        let record = self.neutralize_evidence(&mut evidence)?;
        self.total_evictions += 1;
        warn!(%signature, severity = %evidence.severity(), "evidence evicted under capacity pressure");
        Ok(Some(record))
    }

    fn chain_lock(&self) -> TracehoundResult<MutexGuard<'_, AuditChain>> {
        self.audit
            .lock()
            .map_err(|_| TracehoundError::AuditChainBroken("audit chain lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::{generate_signature, sha256_hex};
    use crate::scent::ThreatCategory;

    fn evidence(label: &str, severity: Severity, captured: u64) -> Evidence {
        let bytes = format!("payload:{}", label).into_bytes();
        let hash = sha256_hex(&bytes);
        let signature = generate_signature(ThreatCategory::Injection, &bytes);
        Evidence::new(bytes, signature, hash, severity)
            .unwrap()
            .with_captured(captured)
    }

    fn quarantine(max_count: usize) -> Quarantine {
        Quarantine::with_config(QuarantineConfig {
            max_count,
            max_bytes: 1_000_000,
            ..QuarantineConfig::default()
        })
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut q = quarantine(10);
        let ev = evidence("a", Severity::Low, 1);
        let signature = ev.signature().to_string();

        match q.insert(ev).unwrap() {
            InsertOutcome::Inserted { evicted } => assert!(evicted.is_empty()),
            other => panic!("expected insert, got {:?}", other),
        }
        assert!(q.has(&signature));
        assert_eq!(q.count(), 1);
        assert!(q.bytes() > 0);
        assert_eq!(q.get(&signature).unwrap().signature(), signature);
    }

    #[test]
    fn test_duplicate_insert_leaves_store_unchanged() {
        let mut q = quarantine(10);
        let first = evidence("same", Severity::Low, 1);
        let second = evidence("same", Severity::Low, 2);
        let signature = first.signature().to_string();

        q.insert(first).unwrap();
        let bytes_before = q.bytes();

        match q.insert(second).unwrap() {
            InsertOutcome::Duplicate { existing, rejected } => {
                assert_eq!(existing.signature, signature);
                assert!(!rejected.disposed());
            }
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert_eq!(q.count(), 1);
        assert_eq!(q.bytes(), bytes_before);
    }

    #[test]
    fn test_count_cap_evicts_lowest_severity_then_oldest() {
        let mut q = quarantine(5);
        let severities = [
            Severity::Low,
            Severity::Low,
            Severity::Low,
            Severity::High,
            Severity::Low,
            Severity::Critical,
        ];
        let mut signatures = Vec::new();
        let mut all_evicted = Vec::new();
        for (i, severity) in severities.iter().enumerate() {
            let ev = evidence(&format!("v{}", i), *severity, i as u64);
            signatures.push(ev.signature().to_string());
            match q.insert(ev).unwrap() {
                InsertOutcome::Inserted { evicted } => all_evicted.extend(evicted),
                other => panic!("unexpected {:?}", other),
            }
        }

        assert_eq!(q.count(), 5);
        assert_eq!(all_evicted.len(), 1);
        // The oldest low-severity entry is the victim.
        assert_eq!(all_evicted[0].signature, signatures[0]);
        // The audit chain recorded exactly the eviction.
        assert_eq!(q.audit_chain().lock().unwrap().len(), 1);
        assert_eq!(q.stats().total_evictions, 1);
    }

    #[test]
    fn test_byte_cap_evicts_until_satisfied() {
        let mut q = Quarantine::with_config(QuarantineConfig {
            max_count: 100,
            max_bytes: 30,
            ..QuarantineConfig::default()
        });

        // Each payload is "payload:bN" = 10 bytes.
        for i in 0..4 {
            q.insert(evidence(&format!("b{}", i), Severity::Medium, i as u64))
                .unwrap();
        }
        assert!(q.bytes() <= 30);
        assert_eq!(q.count(), 3);
    }

    #[test]
    fn test_eviction_priority_invariant() {
        let mut q = quarantine(3);
        q.insert(evidence("a", Severity::Critical, 10)).unwrap();
        q.insert(evidence("b", Severity::Low, 20)).unwrap();
        q.insert(evidence("c", Severity::High, 30)).unwrap();

        match q.insert(evidence("d", Severity::Medium, 40)).unwrap() {
            InsertOutcome::Inserted { evicted } => {
                assert_eq!(evicted.len(), 1);
                let victim_rank = Severity::Low.rank();
                // Every survivor ranks at or above the victim.
                for ev in q.store.values() {
                    assert!(ev.severity().rank() >= victim_rank);
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_neutralize_appends_to_chain_and_removes() {
        let mut q = quarantine(10);
        let ev = evidence("n", Severity::High, 1);
        let signature = ev.signature().to_string();
        q.insert(ev).unwrap();

        let record = q.neutralize(&signature).unwrap().unwrap();
        assert_eq!(record.signature, signature);
        assert_eq!(q.count(), 0);
        assert_eq!(q.bytes(), 0);
        assert_eq!(q.audit_chain().lock().unwrap().len(), 1);

        // Second neutralization of the same signature finds nothing.
        assert!(q.neutralize(&signature).unwrap().is_none());
    }

    #[test]
    fn test_flush_neutralizes_everything() {
        let mut q = quarantine(10);
        for i in 0..4 {
            q.insert(evidence(&format!("f{}", i), Severity::Medium, i as u64))
                .unwrap();
        }

        let records = q.flush().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(q.count(), 0);
        assert_eq!(q.bytes(), 0);

        let chain = q.audit_chain();
        let chain = chain.lock().unwrap();
        assert_eq!(chain.len(), 4);
        assert!(chain.verify().unwrap());
    }

    #[test]
    fn test_purge_skips_audit_chain() {
        let mut q = quarantine(10);
        let ev = evidence("p", Severity::Low, 1).with_source("198.51.100.7");
        let signature = ev.signature().to_string();
        q.insert(ev).unwrap();

        let record = q.purge(&signature, PurgeReason::Timeout).unwrap().unwrap();
        assert_eq!(record.reason, PurgeReason::Timeout);
        assert_eq!(record.source.as_deref(), Some("198.51.100.7"));
        assert_eq!(q.count(), 0);
        assert_eq!(q.audit_chain().lock().unwrap().len(), 0);

        assert!(q.purge(&signature, PurgeReason::Error).unwrap().is_none());
    }

    #[test]
    fn test_evacuate_releases_bytes_without_audit() {
        let mut q = quarantine(10);
        let ev = evidence("e", Severity::High, 1);
        let signature = ev.signature().to_string();
        q.insert(ev).unwrap();

        let (record, bytes) = q
            .evacuate(&signature, "evidence/e.thcs")
            .unwrap()
            .unwrap();
        assert_eq!(record.destination, "evidence/e.thcs");
        assert_eq!(bytes, b"payload:e");
        assert_eq!(q.count(), 0);
        assert_eq!(q.bytes(), 0);
        assert_eq!(q.audit_chain().lock().unwrap().len(), 0);

        assert!(q.evacuate(&signature, "elsewhere").unwrap().is_none());
    }

    #[test]
    fn test_replace_reports_both_outcomes() {
        let mut q = quarantine(10);
        let old = evidence("old", Severity::Low, 1);
        let old_signature = old.signature().to_string();
        q.insert(old).unwrap();

        let outcome = q
            .replace(&old_signature, evidence("new", Severity::High, 2))
            .unwrap();
        assert!(outcome.neutralized.is_some());
        assert!(matches!(outcome.insert, InsertOutcome::Inserted { .. }));
        assert_eq!(q.count(), 1);
        assert!(!q.has(&old_signature));

        // Replacing a missing signature still inserts.
        let outcome = q
            .replace("injection:missing", evidence("another", Severity::Low, 3))
            .unwrap();
        assert!(outcome.neutralized.is_none());
    }

    #[test]
    fn test_stats_breakdown() {
        let mut q = quarantine(10);
        q.insert(evidence("s1", Severity::Low, 1)).unwrap();
        q.insert(evidence("s2", Severity::Low, 2)).unwrap();
        q.insert(evidence("s3", Severity::Critical, 3)).unwrap();

        let stats = q.stats();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.low, 2);
        assert_eq!(stats.medium, 0);
        assert_eq!(stats.critical, 1);
    }

    proptest::proptest! {
        #[test]
        fn prop_eviction_never_outranks_survivors(
            entries in proptest::collection::vec((0u8..4, 0u64..1_000), 1..40)
        ) {
            let mut q = Quarantine::with_config(QuarantineConfig {
                max_count: 8,
                max_bytes: 10_000,
                ..QuarantineConfig::default()
            });
            let mut meta = std::collections::HashMap::new();

            for (i, (rank, captured)) in entries.iter().enumerate() {
                let severity = match rank {
                    0 => Severity::Low,
                    1 => Severity::Medium,
                    2 => Severity::High,
                    _ => Severity::Critical,
                };
                let ev = evidence(&format!("p{}", i), severity, *captured);
                meta.insert(ev.signature().to_string(), (severity.rank(), *captured));

                if let InsertOutcome::Inserted { evicted } = q.insert(ev).unwrap() {
                    for victim in evicted {
                        let victim_key = meta[&victim.signature];
                        for survivor in q.store.values() {
                            let survivor_key =
                                (survivor.severity().rank(), survivor.captured());
                            proptest::prop_assert!(
                                victim_key <= survivor_key,
                                "victim {:?} outranked survivor {:?}",
                                victim_key,
                                survivor_key
                            );
                        }
                    }
                }
                proptest::prop_assert!(q.count() <= 8);
                proptest::prop_assert!(q.bytes() <= 10_000);
            }
        }
    }

    #[test]
    fn test_caps_hold_after_arbitrary_inserts() {
        let mut q = Quarantine::with_config(QuarantineConfig {
            max_count: 7,
            max_bytes: 120,
            ..QuarantineConfig::default()
        });
        for i in 0..40 {
            let severity = match i % 4 {
                0 => Severity::Low,
                1 => Severity::Medium,
                2 => Severity::High,
                _ => Severity::Critical,
            };
            q.insert(evidence(&format!("x{}", i), severity, i as u64))
                .unwrap();
            assert!(q.count() <= 7);
            assert!(q.bytes() <= 120);
        }
        assert!(q.audit_chain().lock().unwrap().verify().unwrap());
    }
}
