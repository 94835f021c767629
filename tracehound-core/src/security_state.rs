//! Aggregate security state: rolling counters and derived health

use crate::failsafe::PanicEvent;
use crate::scent::{now_ms, Severity, ThreatCategory};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Panic events retained for the snapshot
const SNAPSHOT_PANIC_LIMIT: usize = 100;

/// Derived system health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

/// License standing fed by the external gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Valid,
    Grace,
    Expired,
}

/// Immutable point-in-time view of the security state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecuritySnapshot {
    pub threats_total: u64,
    pub threats_by_category: HashMap<ThreatCategory, u64>,
    pub threats_by_severity: HashMap<Severity, u64>,
    pub quarantine_count: usize,
    pub quarantine_bytes: u64,
    /// Quarantine fill fraction against the configured count cap
    pub quarantine_capacity: f64,
    pub rate_limit_blocked: u64,
    pub panic_history: Vec<PanicEvent>,
    pub license: LicenseStatus,
    pub health: HealthStatus,
    pub taken_at: u64,
}

/// Rolling counters behind the snapshot
#[derive(Debug)]
pub struct SecurityState {
    quarantine_max_count: usize,
    threats_by_category: HashMap<ThreatCategory, u64>,
    threats_by_severity: HashMap<Severity, u64>,
    threats_total: u64,
    quarantine_count: usize,
    quarantine_bytes: u64,
    rate_limit_blocked: u64,
    panic_history: VecDeque<PanicEvent>,
    license: LicenseStatus,
}

impl SecurityState {
    pub fn new(quarantine_max_count: usize) -> Self {
        Self {
            quarantine_max_count,
            threats_by_category: HashMap::new(),
            threats_by_severity: HashMap::new(),
            threats_total: 0,
            quarantine_count: 0,
            quarantine_bytes: 0,
            rate_limit_blocked: 0,
            panic_history: VecDeque::with_capacity(SNAPSHOT_PANIC_LIMIT),
            license: LicenseStatus::Valid,
        }
    }

    pub fn record_threat(&mut self, category: ThreatCategory, severity: Severity) {
        self.threats_total += 1;
        *self.threats_by_category.entry(category).or_insert(0) += 1;
        *self.threats_by_severity.entry(severity).or_insert(0) += 1;
    }

    pub fn record_rate_limit_block(&mut self) {
        self.rate_limit_blocked += 1;
    }

    pub fn update_quarantine(&mut self, count: usize, bytes: u64) {
        self.quarantine_count = count;
        self.quarantine_bytes = bytes;
    }

    pub fn record_panic(&mut self, event: PanicEvent) {
        if self.panic_history.len() == SNAPSHOT_PANIC_LIMIT {
            self.panic_history.pop_front();
        }
        self.panic_history.push_back(event);
    }

    pub fn set_license_status(&mut self, status: LicenseStatus) {
        self.license = status;
    }

    /// Quarantine fill fraction against the count cap
    pub fn quarantine_capacity(&self) -> f64 {
        if self.quarantine_max_count == 0 {
            return 0.0;
        }
        self.quarantine_count as f64 / self.quarantine_max_count as f64
    }

    /// Derive health from capacity and license standing
    pub fn health(&self) -> HealthStatus {
        let capacity = self.quarantine_capacity();
        if capacity > 0.90 || self.license == LicenseStatus::Expired {
            HealthStatus::Critical
        } else if capacity > 0.70 || self.license == LicenseStatus::Grace {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Take an immutable snapshot
    pub fn snapshot(&self) -> SecuritySnapshot {
        SecuritySnapshot {
            threats_total: self.threats_total,
            threats_by_category: self.threats_by_category.clone(),
            threats_by_severity: self.threats_by_severity.clone(),
            quarantine_count: self.quarantine_count,
            quarantine_bytes: self.quarantine_bytes,
            quarantine_capacity: self.quarantine_capacity(),
            rate_limit_blocked: self.rate_limit_blocked,
            panic_history: self.panic_history.iter().cloned().collect(),
            license: self.license,
            health: self.health(),
            taken_at: now_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failsafe::{PanicLevel, ProbeKind};

    fn panic_event(details: &str) -> PanicEvent {
        PanicEvent {
            id: crate::evidence::new_record_id(),
            level: PanicLevel::Warning,
            probe: ProbeKind::Manual,
            details: details.to_string(),
            value: 0.0,
            threshold: 0.0,
            timestamp: now_ms(),
        }
    }

    #[test]
    fn test_threat_counters() {
        let mut state = SecurityState::new(100);
        state.record_threat(ThreatCategory::Injection, Severity::High);
        state.record_threat(ThreatCategory::Injection, Severity::Low);
        state.record_threat(ThreatCategory::Ddos, Severity::High);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.threats_total, 3);
        assert_eq!(snapshot.threats_by_category[&ThreatCategory::Injection], 2);
        assert_eq!(snapshot.threats_by_severity[&Severity::High], 2);
    }

    #[test]
    fn test_health_from_capacity() {
        let mut state = SecurityState::new(100);
        assert_eq!(state.health(), HealthStatus::Healthy);

        state.update_quarantine(71, 0);
        assert_eq!(state.health(), HealthStatus::Degraded);

        state.update_quarantine(91, 0);
        assert_eq!(state.health(), HealthStatus::Critical);

        // Exactly at a boundary stays below it.
        state.update_quarantine(70, 0);
        assert_eq!(state.health(), HealthStatus::Healthy);
        state.update_quarantine(90, 0);
        assert_eq!(state.health(), HealthStatus::Degraded);
    }

    #[test]
    fn test_health_from_license() {
        let mut state = SecurityState::new(100);
        state.set_license_status(LicenseStatus::Grace);
        assert_eq!(state.health(), HealthStatus::Degraded);

        state.set_license_status(LicenseStatus::Expired);
        assert_eq!(state.health(), HealthStatus::Critical);

        state.set_license_status(LicenseStatus::Valid);
        assert_eq!(state.health(), HealthStatus::Healthy);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut state = SecurityState::new(10);
        state.record_threat(ThreatCategory::Spam, Severity::Low);
        let snapshot = state.snapshot();

        state.record_threat(ThreatCategory::Spam, Severity::Low);
        assert_eq!(snapshot.threats_total, 1);
        assert_eq!(state.snapshot().threats_total, 2);
    }

    #[test]
    fn test_panic_history_bounded() {
        let mut state = SecurityState::new(10);
        for i in 0..120 {
            state.record_panic(panic_event(&format!("p{}", i)));
        }
        let snapshot = state.snapshot();
        assert_eq!(snapshot.panic_history.len(), 100);
        assert_eq!(snapshot.panic_history[0].details, "p20");
    }
}
