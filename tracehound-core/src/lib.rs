//! # Tracehound Core
//!
//! Inline request-interception buffer placed between an application's
//! ingress and its business logic. Upstream detectors classify requests;
//! the core deduplicates threats by content-addressed signature, seals
//! immutable evidence, stores it in a priority-evicting quarantine, and
//! records every destructive act in a tamper-evident hash-chained audit
//! log.
//!
//! ## Core Components
//!
//! - `InterceptAgent`: the rate-limit → validate → hash → dedupe →
//!   insert state machine
//! - `Evidence`: atomic single-use handle with destroy-on-consume
//!   semantics
//! - `Quarantine`: signature-indexed store with priority+age eviction
//! - `AuditChain`: append-only hash-linked log of neutralizations
//! - `GzipCodec` / `TokioGzipCodec`: hot/cold capability-split payload
//!   codec
//! - `FailSafe`: graduated panic events over capacity and error rates
//! - `NotificationBus` / `SecurityState`: typed events and rolling
//!   counters

pub mod agent;
pub mod audit_chain;
pub mod canonical;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod evidence;
pub mod factory;
pub mod failsafe;
pub mod hashing;
pub mod quarantine;
pub mod rate_limiter;
pub mod scent;
pub mod security_state;

pub use agent::{AgentStats, InterceptAgent, InterceptResult};
pub use audit_chain::{AuditChain, GENESIS_HASH};
pub use canonical::CanonicalPayload;
pub use codec::{
    encode_with_integrity, verify, AsyncForensicCodec, AsyncPayloadCodec, EncodedPayload,
    ForensicCodec, GzipCodec, PayloadCodec, TokioGzipCodec,
};
pub use config::{
    EvictionPolicy, InterceptConfig, QuarantineConfig, RateLimitConfig, DEFAULT_MAX_PAYLOAD_SIZE,
};
pub use envelope::{pack, unpack, ENVELOPE_HEADER_LEN, ENVELOPE_MAGIC, ENVELOPE_VERSION};
pub use error::{TracehoundError, TracehoundResult};
pub use events::{EventKind, NotificationBus, SecurityEvent};
pub use evidence::{
    Evidence, EvidenceSummary, EvacuationRecord, NeutralizationRecord, PurgeReason, PurgeRecord,
};
pub use factory::{EvidenceCapture, EvidenceFactory};
pub use failsafe::{FailSafe, FailSafeConfig, PanicEvent, PanicLevel, ProbeKind, Thresholds};
pub use hashing::{
    constant_time_eq, constant_time_eq_str, generate_signature, is_valid_signature, sha256_hex,
};
pub use quarantine::{InsertOutcome, Quarantine, QuarantineStats, ReplaceOutcome};
pub use rate_limiter::{RateDecision, RateLimiter, RateLimiterStats};
pub use scent::{Scent, Severity, ThreatCategory, ThreatSignal};
pub use security_state::{HealthStatus, LicenseStatus, SecurityState, SecuritySnapshot};
