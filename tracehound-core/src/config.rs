//! Configuration for the intercept core

use crate::error::{TracehoundError, TracehoundResult};
use serde::{Deserialize, Serialize};

/// Default canonical payload cap in bytes
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1_000_000;

/// Eviction policy for the quarantine store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict ascending by (severity rank, capture time)
    Priority,
}

/// Per-source fixed-window rate limit configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window width in milliseconds
    pub window_ms: u64,
    /// Requests allowed per window
    pub max_requests: u32,
    /// Block duration after exceeding the window; zero means no block period
    pub block_duration_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_requests: 100,
            block_duration_ms: 300_000,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> TracehoundResult<()> {
        if self.window_ms == 0 {
            return Err(TracehoundError::InvalidConfig(
                "rate limit window must be positive".to_string(),
            ));
        }
        if self.max_requests == 0 {
            return Err(TracehoundError::InvalidConfig(
                "rate limit max requests must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Quarantine capacity configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineConfig {
    /// Maximum number of stored evidences
    pub max_count: usize,
    /// Maximum total evidence bytes
    pub max_bytes: u64,
    pub eviction_policy: EvictionPolicy,
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            max_count: 10_000,
            max_bytes: 100_000_000,
            eviction_policy: EvictionPolicy::Priority,
        }
    }
}

impl QuarantineConfig {
    pub fn validate(&self) -> TracehoundResult<()> {
        if self.max_count == 0 {
            return Err(TracehoundError::InvalidConfig(
                "quarantine max count must be positive".to_string(),
            ));
        }
        if self.max_bytes == 0 {
            return Err(TracehoundError::InvalidConfig(
                "quarantine max bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the intercept pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptConfig {
    /// Canonical payload byte cap
    pub max_payload_size: usize,
    pub rate_limit: RateLimitConfig,
    pub quarantine: QuarantineConfig,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            rate_limit: RateLimitConfig::default(),
            quarantine: QuarantineConfig::default(),
        }
    }
}

impl InterceptConfig {
    pub fn validate(&self) -> TracehoundResult<()> {
        if self.max_payload_size == 0 {
            return Err(TracehoundError::InvalidConfig(
                "max payload size must be positive".to_string(),
            ));
        }
        self.rate_limit.validate()?;
        self.quarantine.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = InterceptConfig::default();
        assert_eq!(config.max_payload_size, 1_000_000);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.block_duration_ms, 300_000);
        assert_eq!(config.quarantine.max_count, 10_000);
        assert_eq!(config.quarantine.max_bytes, 100_000_000);
        assert_eq!(config.quarantine.eviction_policy, EvictionPolicy::Priority);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = RateLimitConfig {
            window_ms: 0,
            ..RateLimitConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().code(), "CONFIG_INVALID");
    }

    #[test]
    fn test_zero_block_duration_allowed() {
        let config = RateLimitConfig {
            block_duration_ms: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_quarantine_caps_rejected() {
        let config = QuarantineConfig {
            max_count: 0,
            ..QuarantineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = QuarantineConfig {
            max_bytes: 0,
            ..QuarantineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
