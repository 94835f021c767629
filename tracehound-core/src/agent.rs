//! Intercept agent: the state machine between ingress and business logic
//!
//! A single synchronous pass per scent: rate-limit → threat gate →
//! capture → dedupe → insert. Every terminal state is counted exactly
//! once, and nothing on this path suspends.

use crate::config::InterceptConfig;
use crate::error::{TracehoundError, TracehoundResult};
use crate::evidence::{EvidenceSummary, NeutralizationRecord};
use crate::factory::EvidenceFactory;
use crate::quarantine::{InsertOutcome, Quarantine};
use crate::rate_limiter::{RateDecision, RateLimiter};
use crate::scent::Scent;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};

/// Terminal result of one intercept pass
#[derive(Debug)]
pub enum InterceptResult {
    /// No threat signal; forward to business logic
    Clean,
    /// Source is over its window; retry later
    RateLimited { retry_after_ms: u64 },
    /// Canonical payload exceeded the configured cap
    PayloadTooLarge { limit: usize },
    /// Signature already quarantined; the duplicate capture was neutralized
    Ignored { signature: String },
    /// Evidence stored; evictions forced by capacity are reported
    Quarantined {
        summary: EvidenceSummary,
        evicted: Vec<NeutralizationRecord>,
    },
    /// Planned pipeline error, or an unexpected internal failure
    Error { error: TracehoundError },
}

impl InterceptResult {
    /// Short status name for logs and adapters
    pub fn status(&self) -> &'static str {
        match self {
            InterceptResult::Clean => "clean",
            InterceptResult::RateLimited { .. } => "rate_limited",
            InterceptResult::PayloadTooLarge { .. } => "payload_too_large",
            InterceptResult::Ignored { .. } => "ignored",
            InterceptResult::Quarantined { .. } => "quarantined",
            InterceptResult::Error { .. } => "error",
        }
    }

    /// HTTP status a transport adapter should map this result to
    pub fn suggested_http_status(&self) -> u16 {
        match self {
            InterceptResult::Clean | InterceptResult::Ignored { .. } => 200,
            InterceptResult::RateLimited { .. } => 429,
            InterceptResult::PayloadTooLarge { .. } => 413,
            InterceptResult::Quarantined { .. } => 403,
            InterceptResult::Error { .. } => 500,
        }
    }

    /// `Retry-After` header value in whole seconds, rounded up
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            InterceptResult::RateLimited { retry_after_ms } => Some(retry_after_ms.div_ceil(1000)),
            _ => None,
        }
    }
}

/// Exact counters for each terminal state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    pub intercepts: u64,
    pub clean: u64,
    pub rate_limited: u64,
    pub payload_too_large: u64,
    pub ignored: u64,
    pub quarantined: u64,
    pub errors: u64,
}

/// The intercept state machine
#[derive(Debug)]
pub struct InterceptAgent {
    limiter: RateLimiter,
    factory: EvidenceFactory,
    quarantine: Arc<Mutex<Quarantine>>,
    stats: AgentStats,
}

impl InterceptAgent {
    pub fn new(config: &InterceptConfig, quarantine: Arc<Mutex<Quarantine>>) -> Self {
        Self {
            limiter: RateLimiter::new(config.rate_limit),
            factory: EvidenceFactory::new(config.max_payload_size),
            quarantine,
            stats: AgentStats::default(),
        }
    }

    /// Run one scent through the pipeline
    pub fn intercept(&mut self, scent: &Scent) -> InterceptResult {
        self.stats.intercepts += 1;
        let result = match self.run_pipeline(scent) {
            Ok(result) => result,
            Err(err) => {
                error!(scent_id = %scent.id, %err, "intercept pipeline failed");
                InterceptResult::Error {
                    error: TracehoundError::InterceptFailed(err.to_string()),
                }
            }
        };
        self.count(&result);
        debug!(scent_id = %scent.id, status = result.status(), "intercept complete");
        result
    }

    pub fn stats(&self) -> AgentStats {
        self.stats
    }

    pub fn limiter(&mut self) -> &mut RateLimiter {
        &mut self.limiter
    }

    fn run_pipeline(&mut self, scent: &Scent) -> TracehoundResult<InterceptResult> {
        if let RateDecision::Blocked { retry_after_ms } = self.limiter.check(&scent.source) {
            return Ok(InterceptResult::RateLimited { retry_after_ms });
        }

        let threat = match &scent.threat {
            Some(threat) => *threat,
            None => return Ok(InterceptResult::Clean),
        };

        let mut capture = match self.factory.create(scent, &threat) {
            Ok(capture) => capture,
            Err(TracehoundError::PayloadTooLarge { limit, .. }) => {
                return Ok(InterceptResult::PayloadTooLarge { limit })
            }
            Err(error) => return Ok(InterceptResult::Error { error }),
        };

        let mut quarantine = self.quarantine_lock()?;
        if quarantine.has(&capture.signature) {
            // Duplicate: the fresh capture is surplus and gets neutralized
            // through the audit chain like any other destructive act.
            quarantine.neutralize_evidence(&mut capture.evidence)?;
            return Ok(InterceptResult::Ignored {
                signature: capture.signature,
            });
        }

        let summary = capture.evidence.summary();
        match quarantine.insert(capture.evidence)? {
            InsertOutcome::Inserted { evicted } => {
                Ok(InterceptResult::Quarantined { summary, evicted })
            }
            InsertOutcome::Duplicate { mut rejected, .. } => {
                // Lost the check-then-insert race; dispose the surplus.
                quarantine.neutralize_evidence(&mut rejected)?;
                Ok(InterceptResult::Ignored {
                    signature: capture.signature,
                })
            }
        }
    }

    fn count(&mut self, result: &InterceptResult) {
        match result {
            InterceptResult::Clean => self.stats.clean += 1,
            InterceptResult::RateLimited { .. } => self.stats.rate_limited += 1,
            InterceptResult::PayloadTooLarge { .. } => self.stats.payload_too_large += 1,
            InterceptResult::Ignored { .. } => self.stats.ignored += 1,
            InterceptResult::Quarantined { .. } => self.stats.quarantined += 1,
            InterceptResult::Error { .. } => self.stats.errors += 1,
        }
    }

    fn quarantine_lock(&self) -> TracehoundResult<MutexGuard<'_, Quarantine>> {
        self.quarantine
            .lock()
            .map_err(|_| TracehoundError::InterceptFailed("quarantine lock poisoned".to_string()))
    }
}
