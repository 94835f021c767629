//! Fail-safe: graduated panic events over capacity and error thresholds
//!
//! Probes compare a measured ratio or rate against configured
//! warning/critical/emergency thresholds, highest first, and emit at most
//! one event per probe. Callbacks are registered per level plus an "any"
//! channel; a bounded ring retains the last 100 events.

use crate::evidence::new_record_id;
use crate::scent::now_ms;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{error, warn};

/// Number of panic events retained in memory
pub const PANIC_HISTORY_LIMIT: usize = 100;

/// Graduated panic levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanicLevel {
    Warning,
    Critical,
    Emergency,
}

impl fmt::Display for PanicLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PanicLevel::Warning => "warning",
            PanicLevel::Critical => "critical",
            PanicLevel::Emergency => "emergency",
        };
        f.write_str(s)
    }
}

/// Which probe produced a panic event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    QuarantineCapacity,
    Memory,
    ErrorRate,
    Manual,
}

/// A single fail-safe firing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanicEvent {
    pub id: String,
    pub level: PanicLevel,
    pub probe: ProbeKind,
    pub details: String,
    /// Measured value that crossed the threshold
    pub value: f64,
    /// The threshold that was crossed
    pub threshold: f64,
    pub timestamp: u64,
}

/// Ascending thresholds for one probe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
    pub emergency: f64,
}

impl Thresholds {
    pub fn new(warning: f64, critical: f64, emergency: f64) -> Self {
        Self {
            warning,
            critical,
            emergency,
        }
    }

    /// Highest level the value reaches, with the matching threshold
    fn grade(&self, value: f64) -> Option<(PanicLevel, f64)> {
        if value >= self.emergency {
            Some((PanicLevel::Emergency, self.emergency))
        } else if value >= self.critical {
            Some((PanicLevel::Critical, self.critical))
        } else if value >= self.warning {
            Some((PanicLevel::Warning, self.warning))
        } else {
            None
        }
    }
}

/// Fail-safe configuration: thresholds per probe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FailSafeConfig {
    /// Quarantine fill fraction (count / max)
    pub quarantine_capacity: Thresholds,
    /// Memory fill fraction (used / max)
    pub memory: Thresholds,
    /// Errors per minute
    pub error_rate: Thresholds,
}

impl Default for FailSafeConfig {
    fn default() -> Self {
        Self {
            quarantine_capacity: Thresholds::new(0.70, 0.90, 0.98),
            memory: Thresholds::new(0.75, 0.90, 0.97),
            error_rate: Thresholds::new(10.0, 60.0, 300.0),
        }
    }
}

type PanicCallback = Box<dyn Fn(&PanicEvent) + Send + Sync>;

/// Threshold monitor with graduated callbacks and a bounded event ring
pub struct FailSafe {
    config: FailSafeConfig,
    history: VecDeque<PanicEvent>,
    level_callbacks: HashMap<PanicLevel, Vec<PanicCallback>>,
    any_callbacks: Vec<PanicCallback>,
}

impl fmt::Debug for FailSafe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailSafe")
            .field("config", &self.config)
            .field("history_len", &self.history.len())
            .finish()
    }
}

impl FailSafe {
    pub fn new(config: FailSafeConfig) -> Self {
        Self {
            config,
            history: VecDeque::with_capacity(PANIC_HISTORY_LIMIT),
            level_callbacks: HashMap::new(),
            any_callbacks: Vec::new(),
        }
    }

    /// Register a callback for one level
    pub fn on_level<F>(&mut self, level: PanicLevel, callback: F)
    where
        F: Fn(&PanicEvent) + Send + Sync + 'static,
    {
        self.level_callbacks
            .entry(level)
            .or_default()
            .push(Box::new(callback));
    }

    /// Register a callback for every level
    pub fn on_any<F>(&mut self, callback: F)
    where
        F: Fn(&PanicEvent) + Send + Sync + 'static,
    {
        self.any_callbacks.push(Box::new(callback));
    }

    /// Probe quarantine fill; emits at most one event
    pub fn check_quarantine(&mut self, count: usize, max: usize) -> Option<PanicEvent> {
        if max == 0 {
            return None;
        }
        let ratio = count as f64 / max as f64;
        self.probe(ProbeKind::QuarantineCapacity, self.config.quarantine_capacity, ratio, || {
            format!("quarantine at {} of {}", count, max)
        })
    }

    /// Probe memory fill; emits at most one event
    pub fn check_memory(&mut self, used: u64, max: u64) -> Option<PanicEvent> {
        if max == 0 {
            return None;
        }
        let ratio = used as f64 / max as f64;
        self.probe(ProbeKind::Memory, self.config.memory, ratio, || {
            format!("memory at {} of {} bytes", used, max)
        })
    }

    /// Probe the error rate in errors per minute; emits at most one event
    pub fn check_error_rate(&mut self, errors_per_minute: f64) -> Option<PanicEvent> {
        self.probe(ProbeKind::ErrorRate, self.config.error_rate, errors_per_minute, || {
            format!("{:.1} errors per minute", errors_per_minute)
        })
    }

    /// Raise a panic event directly
    pub fn panic(&mut self, level: PanicLevel, details: impl Into<String>) -> PanicEvent {
        let event = PanicEvent {
            id: new_record_id(),
            level,
            probe: ProbeKind::Manual,
            details: details.into(),
            value: 0.0,
            threshold: 0.0,
            timestamp: now_ms(),
        };
        self.fire(event.clone());
        event
    }

    /// Retained events, oldest first
    pub fn history(&self) -> Vec<PanicEvent> {
        self.history.iter().cloned().collect()
    }

    fn probe<F>(
        &mut self,
        probe: ProbeKind,
        thresholds: Thresholds,
        value: f64,
        details: F,
    ) -> Option<PanicEvent>
    where
        F: FnOnce() -> String,
    {
        let (level, threshold) = thresholds.grade(value)?;
        let event = PanicEvent {
            id: new_record_id(),
            level,
            probe,
            details: details(),
            value,
            threshold,
            timestamp: now_ms(),
        };
        self.fire(event.clone());
        Some(event)
    }

    fn fire(&mut self, event: PanicEvent) {
        error!(level = %event.level, probe = ?event.probe, details = %event.details, "fail-safe panic");
        if self.history.len() == PANIC_HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(event.clone());

        if let Some(callbacks) = self.level_callbacks.get(&event.level) {
            for callback in callbacks {
                Self::invoke(callback, &event);
            }
        }
        for callback in &self.any_callbacks {
            Self::invoke(callback, &event);
        }
    }

    fn invoke(callback: &PanicCallback, event: &PanicEvent) {
        if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            warn!("fail-safe callback panicked; dropped");
        }
    }
}
