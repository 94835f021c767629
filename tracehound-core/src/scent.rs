//! Scent model: the classified request unit entering the intercept pipeline
//!
//! A scent is produced by an upstream detector. Tracehound performs no
//! classification of its own; a scent without a threat signal is the
//! detector's explicit clean verdict.

use crate::error::{TracehoundError, TracehoundResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Threat categories assigned by upstream detectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatCategory {
    Injection,
    Ddos,
    Flood,
    Spam,
    Malware,
    Unknown,
}

impl ThreatCategory {
    /// Wire name used as the signature prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatCategory::Injection => "injection",
            ThreatCategory::Ddos => "ddos",
            ThreatCategory::Flood => "flood",
            ThreatCategory::Spam => "spam",
            ThreatCategory::Malware => "malware",
            ThreatCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Threat severity, ordered low to critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Eviction rank: low evicts first
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 1,
            Severity::High => 2,
            Severity::Critical => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The upstream classifier's verdict attached to a scent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatSignal {
    pub category: ThreatCategory,
    pub severity: Severity,
}

impl ThreatSignal {
    pub fn new(category: ThreatCategory, severity: Severity) -> Self {
        Self { category, severity }
    }
}

/// An untrusted request captured for evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scent {
    /// Opaque unique identifier
    pub id: String,
    /// Origin identifier, used as the rate-limit key
    pub source: String,
    /// Capture time in milliseconds since epoch
    pub timestamp: u64,
    /// Structured payload: finite primitives, ordered lists, keyed maps
    pub payload: serde_json::Value,
    /// Threat signal; absence is the classifier's explicit clean verdict
    pub threat: Option<ThreatSignal>,
}

impl Scent {
    /// Create a clean scent stamped with the current time
    pub fn new(id: impl Into<String>, source: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            timestamp: now_ms(),
            payload,
            threat: None,
        }
    }

    /// Attach a threat signal
    pub fn with_threat(mut self, category: ThreatCategory, severity: Severity) -> Self {
        self.threat = Some(ThreatSignal::new(category, severity));
        self
    }

    /// Override the capture timestamp
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Structural validation performed before the pipeline runs
    pub fn validate(&self) -> TracehoundResult<()> {
        if self.source.trim().is_empty() {
            return Err(TracehoundError::ScentSourceMissing(format!(
                "scent {} has no source",
                self.id
            )));
        }
        Ok(())
    }
}

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
