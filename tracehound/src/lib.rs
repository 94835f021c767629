//! # Tracehound
//!
//! The assembled interception system: core pipeline, notification bus,
//! security state, fail-safe, and the optional out-of-process
//! collaborators (hound pool, cold storage). Transport adapters hand
//! scents to `Tracehound::intercept` and map the result onto their
//! protocol; everything else is wiring.
//!
//! The core crates stay free of this composition: each component takes
//! its dependencies explicitly, and this crate owns the one convenience
//! constructor.

use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracehound_core::{
    AgentStats, AuditChain, EvacuationRecord, FailSafe, FailSafeConfig, HealthStatus,
    InterceptAgent, InterceptConfig, InterceptResult, LicenseStatus, NeutralizationRecord,
    NotificationBus, PanicEvent, PanicLevel, PurgeReason, PurgeRecord, Quarantine,
    QuarantineStats, Scent, SecurityEvent, SecuritySnapshot, SecurityState, TokioGzipCodec,
    TracehoundError, TracehoundResult,
};
use tracehound_hound::{HoundOutcome, HoundPool, PoolStats};
use tracehound_storage::{ColdStorageAdapter, ColdStorageError};
use tracing::{debug, info, warn};

pub use tracehound_core as core;
pub use tracehound_hound as hound;
pub use tracehound_storage as storage;

/// Full system configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TracehoundConfig {
    pub intercept: InterceptConfig,
    pub failsafe: FailSafeConfig,
    /// Queue depth for pull-style event subscribers
    pub event_capacity: usize,
    /// Advisory endpoint recorded for operators; the cold storage client
    /// itself arrives as a collaborator
    pub cold_storage_endpoint: Option<String>,
}

impl Default for TracehoundConfig {
    fn default() -> Self {
        Self {
            intercept: InterceptConfig::default(),
            failsafe: FailSafeConfig::default(),
            event_capacity: tracehound_core::events::DEFAULT_EVENT_CAPACITY,
            cold_storage_endpoint: None,
        }
    }
}

/// Optional out-of-process collaborators
#[derive(Debug, Default)]
pub struct Collaborators {
    pub hound_pool: Option<HoundPool>,
    pub cold_storage: Option<ColdStorageAdapter>,
}

/// Errors from archiving evidence to cold storage
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("No cold storage collaborator is configured")]
    Disabled,
    #[error("Signature not quarantined: {0}")]
    NotQuarantined(String),
    #[error(transparent)]
    Storage(#[from] ColdStorageError),
    #[error(transparent)]
    Core(#[from] TracehoundError),
}

/// Aggregate statistics across the assembled system
#[derive(Debug, Clone)]
pub struct TracehoundStats {
    pub agent: AgentStats,
    pub quarantine: QuarantineStats,
    pub pool: Option<PoolStats>,
    pub health: HealthStatus,
}

/// The assembled interception system
pub struct Tracehound {
    config: TracehoundConfig,
    agent: Mutex<InterceptAgent>,
    quarantine: Arc<Mutex<Quarantine>>,
    bus: Arc<Mutex<NotificationBus>>,
    security: Arc<Mutex<SecurityState>>,
    failsafe: Arc<Mutex<FailSafe>>,
    codec: TokioGzipCodec,
    pool: Option<HoundPool>,
    cold_storage: Option<ColdStorageAdapter>,
}

impl std::fmt::Debug for Tracehound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracehound")
            .field("config", &self.config)
            .field("hound_pool", &self.pool.is_some())
            .field("cold_storage", &self.cold_storage.is_some())
            .finish()
    }
}

impl Tracehound {
    /// Build the system; collaborators are explicit and optional
    pub fn new(
        config: TracehoundConfig,
        collaborators: Collaborators,
    ) -> TracehoundResult<Self> {
        config.intercept.validate()?;

        let quarantine = Arc::new(Mutex::new(Quarantine::with_config(
            config.intercept.quarantine,
        )));
        let agent = InterceptAgent::new(&config.intercept, Arc::clone(&quarantine));
        let bus = Arc::new(Mutex::new(NotificationBus::new(config.event_capacity)));
        let security = Arc::new(Mutex::new(SecurityState::new(
            config.intercept.quarantine.max_count,
        )));

        let mut failsafe = FailSafe::new(config.failsafe);
        {
            // Panic events flow onto the bus and into the security state.
            let bus = Arc::clone(&bus);
            let security = Arc::clone(&security);
            failsafe.on_any(move |event: &PanicEvent| {
                if let Ok(mut security) = security.lock() {
                    security.record_panic(event.clone());
                }
                if let Ok(bus) = bus.lock() {
                    bus.emit(SecurityEvent::SystemPanic {
                        level: event.level,
                        details: event.details.clone(),
                    });
                }
            });
        }

        if let Some(endpoint) = &config.cold_storage_endpoint {
            info!(%endpoint, "cold storage endpoint configured");
        }

        Ok(Self {
            config,
            agent: Mutex::new(agent),
            quarantine,
            bus,
            security,
            failsafe: Arc::new(Mutex::new(failsafe)),
            codec: TokioGzipCodec::new(),
            pool: collaborators.hound_pool,
            cold_storage: collaborators.cold_storage,
        })
    }

    /// Run one scent through the pipeline and fan out the side effects
    pub fn intercept(&self, scent: &Scent) -> InterceptResult {
        let result = match self.agent.lock() {
            Ok(mut agent) => agent.intercept(scent),
            Err(_) => {
                return InterceptResult::Error {
                    error: TracehoundError::InterceptFailed("agent lock poisoned".to_string()),
                }
            }
        };
        self.react(scent, &result);
        result
    }

    /// Neutralize a quarantined evidence through the audit chain
    pub fn neutralize(&self, signature: &str) -> TracehoundResult<Option<NeutralizationRecord>> {
        self.quarantine_lock()?.neutralize(signature)
    }

    /// Neutralize every quarantined evidence
    pub fn flush(&self) -> TracehoundResult<Vec<NeutralizationRecord>> {
        self.quarantine_lock()?.flush()
    }

    /// Forcibly dispose a quarantined evidence without audit linkage
    pub fn purge(
        &self,
        signature: &str,
        reason: PurgeReason,
    ) -> TracehoundResult<Option<PurgeRecord>> {
        self.quarantine_lock()?.purge(signature, reason)
    }

    /// Replay the audit chain end to end
    pub fn verify_audit_chain(&self) -> TracehoundResult<bool> {
        let chain = self.audit_chain();
        let chain = chain
            .lock()
            .map_err(|_| TracehoundError::AuditChainBroken("lock poisoned".to_string()))?;
        chain.verify()
    }

    /// Shared handle to the audit chain
    pub fn audit_chain(&self) -> Arc<Mutex<AuditChain>> {
        match self.quarantine.lock() {
            Ok(quarantine) => quarantine.audit_chain(),
            // The Arc is also reachable through a poisoned guard.
            Err(poisoned) => poisoned.into_inner().audit_chain(),
        }
    }

    /// Compress, envelope and persist a quarantined evidence, then
    /// evacuate it from the quarantine
    pub async fn archive(&self, signature: &str) -> Result<EvacuationRecord, ArchiveError> {
        let cold_storage = self.cold_storage.as_ref().ok_or(ArchiveError::Disabled)?;

        let (bytes, hash) = {
            let quarantine = self.quarantine_lock()?;
            let evidence = quarantine
                .get(signature)
                .ok_or_else(|| ArchiveError::NotQuarantined(signature.to_string()))?;
            (
                evidence.bytes().map_err(ArchiveError::Core)?.to_vec(),
                evidence.hash().to_string(),
            )
        };

        let encoded = self
            .codec
            .encode_with_integrity(bytes)
            .await
            .map_err(ArchiveError::Core)?;
        let destination = cold_storage.object_key(&hash);
        cold_storage.write(&hash, &encoded).await?;

        let evacuated = self.quarantine_lock()?.evacuate(signature, &destination)?;
        match evacuated {
            Some((record, _bytes)) => Ok(record),
            // Raced a neutralize between the write and the evacuation;
            // the archive itself still succeeded.
            None => Err(ArchiveError::NotQuarantined(signature.to_string())),
        }
    }

    /// Feed the license gate's verdict into health and events
    pub fn set_license_status(&self, status: LicenseStatus, subject: impl Into<String>) {
        let subject = subject.into();
        if let Ok(mut security) = self.security.lock() {
            security.set_license_status(status);
        }
        if let Ok(bus) = self.bus.lock() {
            match status {
                LicenseStatus::Expired => bus.emit(SecurityEvent::LicenseExpired { subject }),
                LicenseStatus::Valid | LicenseStatus::Grace => {
                    bus.emit(SecurityEvent::LicenseValidated { subject })
                }
            }
        }
    }

    /// Open a pull subscription for security events
    pub fn subscribe_events(&self) -> TracehoundResult<broadcast::Receiver<SecurityEvent>> {
        self.bus
            .lock()
            .map(|bus| bus.subscribe())
            .map_err(|_| TracehoundError::InterceptFailed("bus lock poisoned".to_string()))
    }

    /// Open a result subscription on the hound pool, when one is wired
    pub fn hound_results(&self) -> Option<mpsc::UnboundedReceiver<HoundOutcome>> {
        self.pool.as_ref().map(|pool| pool.subscribe())
    }

    /// Cancel an in-flight hound analysis by signature
    pub fn terminate_analysis(&self, signature: &str) -> bool {
        self.pool
            .as_ref()
            .map(|pool| pool.terminate(signature))
            .unwrap_or(false)
    }

    /// Probe memory pressure through the fail-safe
    pub fn check_memory(&self, used: u64, max: u64) -> Option<PanicEvent> {
        self.failsafe.lock().ok()?.check_memory(used, max)
    }

    /// Probe the observed error rate through the fail-safe
    pub fn check_error_rate(&self, errors_per_minute: f64) -> Option<PanicEvent> {
        self.failsafe.lock().ok()?.check_error_rate(errors_per_minute)
    }

    /// Raise a manual panic event
    pub fn panic(&self, level: PanicLevel, details: impl Into<String>) -> Option<PanicEvent> {
        self.failsafe.lock().ok().map(|mut fs| fs.panic(level, details))
    }

    /// Immutable security snapshot with derived health
    pub fn security_snapshot(&self) -> TracehoundResult<SecuritySnapshot> {
        self.security
            .lock()
            .map(|security| security.snapshot())
            .map_err(|_| TracehoundError::InterceptFailed("security lock poisoned".to_string()))
    }

    /// Aggregate statistics
    pub fn stats(&self) -> TracehoundResult<TracehoundStats> {
        let agent = self
            .agent
            .lock()
            .map_err(|_| TracehoundError::InterceptFailed("agent lock poisoned".to_string()))?
            .stats();
        let quarantine = self.quarantine_lock()?.stats();
        let health = self.security_snapshot()?.health;
        Ok(TracehoundStats {
            agent,
            quarantine,
            pool: self.pool.as_ref().map(|pool| pool.stats()),
            health,
        })
    }

    /// Tear down the hound pool; the quarantine remains queryable
    pub async fn shutdown(&mut self) {
        if let Some(pool) = self.pool.as_mut() {
            pool.shutdown().await;
        }
        info!("tracehound shut down");
    }

    /// Fan out events, counters, probes and hound activation for a result
    fn react(&self, scent: &Scent, result: &InterceptResult) {
        match result {
            InterceptResult::Quarantined { summary, evicted } => {
                if let Some(threat) = &scent.threat {
                    if let Ok(mut security) = self.security.lock() {
                        security.record_threat(threat.category, threat.severity);
                    }
                    self.emit(SecurityEvent::ThreatDetected {
                        signature: summary.signature.clone(),
                        category: threat.category,
                        severity: threat.severity,
                        source: scent.source.clone(),
                    });
                }
                self.emit(SecurityEvent::EvidenceQuarantined {
                    summary: summary.clone(),
                });
                for record in evicted {
                    self.emit(SecurityEvent::EvidenceEvicted {
                        record: record.clone(),
                    });
                }
                self.refresh_capacity();
                self.dispatch_analysis(&summary.signature);
            }
            InterceptResult::Ignored { signature } => {
                if let Some(threat) = &scent.threat {
                    if let Ok(mut security) = self.security.lock() {
                        security.record_threat(threat.category, threat.severity);
                    }
                    self.emit(SecurityEvent::ThreatDetected {
                        signature: signature.clone(),
                        category: threat.category,
                        severity: threat.severity,
                        source: scent.source.clone(),
                    });
                }
            }
            InterceptResult::RateLimited { retry_after_ms } => {
                if let Ok(mut security) = self.security.lock() {
                    security.record_rate_limit_block();
                }
                self.emit(SecurityEvent::RateLimitExceeded {
                    source: scent.source.clone(),
                    retry_after_ms: *retry_after_ms,
                });
            }
            InterceptResult::Clean
            | InterceptResult::PayloadTooLarge { .. }
            | InterceptResult::Error { .. } => {}
        }
    }

    /// Refresh quarantine gauges and run the capacity probe
    fn refresh_capacity(&self) {
        let Ok(quarantine) = self.quarantine.lock() else {
            return;
        };
        let count = quarantine.count();
        let bytes = quarantine.bytes();
        drop(quarantine);

        if let Ok(mut security) = self.security.lock() {
            security.update_quarantine(count, bytes);
        }
        if let Ok(mut failsafe) = self.failsafe.lock() {
            failsafe.check_quarantine(count, self.config.intercept.quarantine.max_count);
        }
    }

    /// Fire-and-forget hound activation for a freshly quarantined evidence
    fn dispatch_analysis(&self, signature: &str) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };
        let Ok(quarantine) = self.quarantine.lock() else {
            return;
        };
        match quarantine.get(signature) {
            Some(evidence) => pool.activate(evidence),
            None => {
                // Evicted in the same insert; nothing left to analyze.
                debug!(%signature, "evidence gone before analysis dispatch");
            }
        }
    }

    fn emit(&self, event: SecurityEvent) {
        match self.bus.lock() {
            Ok(bus) => bus.emit(event),
            Err(_) => warn!("notification bus poisoned; event dropped"),
        }
    }

    fn quarantine_lock(&self) -> TracehoundResult<MutexGuard<'_, Quarantine>> {
        self.quarantine
            .lock()
            .map_err(|_| TracehoundError::InterceptFailed("quarantine lock poisoned".to_string()))
    }
}
