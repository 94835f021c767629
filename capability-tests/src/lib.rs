//! End-to-end scenarios for the assembled Tracehound system
//!
//! Each scenario drives the public surface the way a transport adapter or
//! operator would: scents in, intercept results and events out, with the
//! quarantine, audit chain, hound pool, and cold storage observed from the
//! outside.

use serde_json::json;
use tracehound::{Collaborators, Tracehound, TracehoundConfig};
use tracehound_core::{
    InterceptConfig, InterceptResult, QuarantineConfig, RateLimitConfig, Scent, Severity,
    ThreatCategory,
};

/// Build a system with default configuration and no collaborators
pub fn default_system() -> Tracehound {
    Tracehound::new(TracehoundConfig::default(), Collaborators::default())
        .expect("default config is valid")
}

/// Build a system over a customized intercept configuration
pub fn system_with(intercept: InterceptConfig) -> Tracehound {
    Tracehound::new(
        TracehoundConfig {
            intercept,
            ..TracehoundConfig::default()
        },
        Collaborators::default(),
    )
    .expect("config is valid")
}

/// A scent carrying a threat signal
pub fn threat_scent(
    id: &str,
    source: &str,
    payload: serde_json::Value,
    category: ThreatCategory,
    severity: Severity,
) -> Scent {
    Scent::new(id, source, payload).with_threat(category, severity)
}





#[cfg(test)]
mod audit_scenarios {
    use super::*;

    #[test]
    fn chain_links_survive_mixed_operations_and_tampering_breaks_them() {
        let th = default_system();

        let mut signatures = Vec::new();
        for i in 0..4 {
            let scent = threat_scent(
                &format!("s-{}", i),
                "10.0.0.8",
                json!({"wave": i}),
                ThreatCategory::Ddos,
                Severity::Medium,
            );
            if let InterceptResult::Quarantined { summary, .. } = th.intercept(&scent) {
                signatures.push(summary.signature);
            }
        }

        th.neutralize(&signatures[0]).unwrap().unwrap();
        th.neutralize(&signatures[2]).unwrap().unwrap();
        let flushed = th.flush().unwrap();
        assert_eq!(flushed.len(), 2);
        assert!(th.verify_audit_chain().unwrap());

        // Every link points at the hash of its predecessor.
        let chain = th.audit_chain();
        let chain = chain.lock().unwrap();
        assert_eq!(chain.len(), 4);
        for window in chain.records().windows(2) {
            let prev = tracehound_core::AuditChain::record_hash(&window[0]).unwrap();
            assert_eq!(window[1].previous_hash, prev);
        }
    }

    #[test]
    fn forged_link_is_rejected_at_append_time() {
        use tracehound_core::{AuditChain, NeutralizationRecord};

        let th = default_system();
        let scent = threat_scent(
            "s-1",
            "10.0.0.9",
            json!({"forge": true}),
            ThreatCategory::Unknown,
            Severity::Low,
        );
        let signature = match th.intercept(&scent) {
            InterceptResult::Quarantined { summary, .. } => summary.signature,
            other => panic!("expected quarantined, got {:?}", other),
        };
        let genuine = th.neutralize(&signature).unwrap().unwrap();

        // Replaying the same record against the advanced tail fails.
        let chain = th.audit_chain();
        let mut chain = chain.lock().unwrap();
        let forged = NeutralizationRecord {
            previous_hash: AuditChain::record_hash(&genuine).unwrap() + "00",
            ..genuine
        };
        assert!(chain.append(forged).is_err());
        assert_eq!(chain.len(), 1);
        assert!(chain.verify().unwrap());
    }
}
