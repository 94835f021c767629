//! Typed security event bus
//!
//! Synchronous callbacks are registered per event kind or for every kind.
//! Pull-style consumers subscribe to a bounded broadcast channel that
//! drops the oldest events when a receiver lags and cancels cleanly when
//! the receiver is released.

use crate::evidence::{EvidenceSummary, NeutralizationRecord};
use crate::failsafe::PanicLevel;
use crate::scent::{Severity, ThreatCategory};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;

/// Default pull-subscriber queue depth
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Discriminant for callback registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ThreatDetected,
    EvidenceQuarantined,
    EvidenceEvicted,
    RateLimitExceeded,
    LicenseValidated,
    LicenseExpired,
    SystemPanic,
}

/// Events carried on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SecurityEvent {
    ThreatDetected {
        signature: String,
        category: ThreatCategory,
        severity: Severity,
        source: String,
    },
    EvidenceQuarantined {
        summary: EvidenceSummary,
    },
    EvidenceEvicted {
        record: NeutralizationRecord,
    },
    RateLimitExceeded {
        source: String,
        retry_after_ms: u64,
    },
    LicenseValidated {
        subject: String,
    },
    LicenseExpired {
        subject: String,
    },
    SystemPanic {
        level: PanicLevel,
        details: String,
    },
}

impl SecurityEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SecurityEvent::ThreatDetected { .. } => EventKind::ThreatDetected,
            SecurityEvent::EvidenceQuarantined { .. } => EventKind::EvidenceQuarantined,
            SecurityEvent::EvidenceEvicted { .. } => EventKind::EvidenceEvicted,
            SecurityEvent::RateLimitExceeded { .. } => EventKind::RateLimitExceeded,
            SecurityEvent::LicenseValidated { .. } => EventKind::LicenseValidated,
            SecurityEvent::LicenseExpired { .. } => EventKind::LicenseExpired,
            SecurityEvent::SystemPanic { .. } => EventKind::SystemPanic,
        }
    }

    /// Dotted wire name of the event kind
    pub fn name(&self) -> &'static str {
        match self.kind() {
            EventKind::ThreatDetected => "threat.detected",
            EventKind::EvidenceQuarantined => "evidence.quarantined",
            EventKind::EvidenceEvicted => "evidence.evicted",
            EventKind::RateLimitExceeded => "rate_limit.exceeded",
            EventKind::LicenseValidated => "license.validated",
            EventKind::LicenseExpired => "license.expired",
            EventKind::SystemPanic => "system.panic",
        }
    }
}

type EventCallback = Box<dyn Fn(&SecurityEvent) + Send + Sync>;

/// Typed event bus with sync callbacks and broadcast pull subscribers
pub struct NotificationBus {
    callbacks: HashMap<EventKind, Vec<EventCallback>>,
    any_callbacks: Vec<EventCallback>,
    sender: broadcast::Sender<SecurityEvent>,
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            callbacks: HashMap::new(),
            any_callbacks: Vec::new(),
            sender,
        }
    }

    /// Register a synchronous callback for one event kind
    pub fn on<F>(&mut self, kind: EventKind, callback: F)
    where
        F: Fn(&SecurityEvent) + Send + Sync + 'static,
    {
        self.callbacks.entry(kind).or_default().push(Box::new(callback));
    }

    /// Register a synchronous callback for every event
    pub fn on_any<F>(&mut self, callback: F)
    where
        F: Fn(&SecurityEvent) + Send + Sync + 'static,
    {
        self.any_callbacks.push(Box::new(callback));
    }

    /// Open a pull subscription; lagging receivers lose the oldest events
    pub fn subscribe(&self) -> broadcast::Receiver<SecurityEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to callbacks and subscribers
    pub fn emit(&self, event: SecurityEvent) {
        debug!(event = event.name(), "security event");
        if let Some(callbacks) = self.callbacks.get(&event.kind()) {
            for callback in callbacks {
                callback(&event);
            }
        }
        for callback in &self.any_callbacks {
            callback(&event);
        }
        // No receivers is fine; the send result only signals that.
        let _ = self.sender.send(event);
    }
}
