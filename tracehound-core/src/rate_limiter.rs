//! Per-source fixed-window rate limiter
//!
//! Each source gets a fixed window of `max_requests`; exceeding it blocks
//! the source for `block_duration_ms`. Expired windows reset lazily on the
//! next check; `cleanup` drops entries whose window and block have both
//! long expired.

use crate::config::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Decision for a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request may proceed
    Allowed { remaining: u32 },
    /// Request is rejected; retry after the given delay
    Blocked { retry_after_ms: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Rolling limiter statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterStats {
    /// Sources currently tracked
    pub tracked_sources: usize,
    /// Sources currently inside a block period
    pub blocked_sources: usize,
    /// Total rejected checks over the limiter's lifetime
    pub total_blocked: u64,
}

#[derive(Debug, Clone, Copy)]
struct SourceWindow {
    count: u32,
    window_start: u64,
    blocked_until: Option<u64>,
}

/// Fixed-window, per-source limiter with lazy expiry
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: HashMap<String, SourceWindow>,
    total_blocked: u64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            total_blocked: 0,
        }
    }

    /// Check and count one request from `source`
    pub fn check(&mut self, source: &str) -> RateDecision {
        self.check_at(source, crate::scent::now_ms())
    }

    /// Check against an explicit clock, for deterministic callers
    pub fn check_at(&mut self, source: &str, now: u64) -> RateDecision {
        let config = self.config;
        let entry = self.entries.entry(source.to_string()).or_insert(SourceWindow {
            count: 0,
            window_start: now,
            blocked_until: None,
        });

        if let Some(blocked_until) = entry.blocked_until {
            if now < blocked_until {
                self.total_blocked += 1;
                return RateDecision::Blocked {
                    retry_after_ms: blocked_until - now,
                };
            }
            entry.blocked_until = None;
        }

        if now.saturating_sub(entry.window_start) >= config.window_ms {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        if entry.count > config.max_requests {
            let retry_after_ms = if config.block_duration_ms > 0 {
                entry.blocked_until = Some(now + config.block_duration_ms);
                config.block_duration_ms
            } else {
                // No block period: reject until the window rolls over.
                (entry.window_start + config.window_ms).saturating_sub(now)
            };
            self.total_blocked += 1;
            warn!(%source, retry_after_ms, "rate limit exceeded");
            return RateDecision::Blocked { retry_after_ms };
        }

        RateDecision::Allowed {
            remaining: config.max_requests - entry.count,
        }
    }

    /// Forget everything known about a source
    pub fn reset(&mut self, source: &str) {
        self.entries.remove(source);
        debug!(%source, "rate limit state reset");
    }

    /// Drop entries whose window and block have both expired by at least
    /// one window width
    pub fn cleanup(&mut self) {
        self.cleanup_at(crate::scent::now_ms());
    }

    /// Cleanup against an explicit clock
    pub fn cleanup_at(&mut self, now: u64) {
        let horizon = self.config.window_ms + self.config.block_duration_ms;
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            let window_expired = now.saturating_sub(entry.window_start) > horizon;
            let block_expired = entry
                .blocked_until
                .map_or(true, |until| now.saturating_sub(until) > self.config.window_ms);
            !(window_expired && block_expired)
        });
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(dropped, "rate limiter cleanup");
        }
    }

    pub fn stats(&self) -> RateLimiterStats {
        let now = crate::scent::now_ms();
        let blocked_sources = self
            .entries
            .values()
            .filter(|e| e.blocked_until.map_or(false, |until| now < until))
            .count();
        RateLimiterStats {
            tracked_sources: self.entries.len(),
            blocked_sources,
            total_blocked: self.total_blocked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_ms: u64, block_duration_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window_ms,
            max_requests,
            block_duration_ms,
        })
    }

    #[test]
    fn test_allows_up_to_limit_then_blocks() {
        let mut rl = limiter(5, 60_000, 300_000);
        for i in 0..5 {
            let decision = rl.check_at("src", 1_000 + i);
            assert!(decision.is_allowed(), "check {} should pass", i);
        }
        match rl.check_at("src", 1_010) {
            RateDecision::Blocked { retry_after_ms } => assert_eq!(retry_after_ms, 300_000),
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn test_block_persists_until_expiry() {
        let mut rl = limiter(1, 1_000, 5_000);
        assert!(rl.check_at("src", 0).is_allowed());
        assert!(!rl.check_at("src", 10).is_allowed());

        // Mid-block: rejected with the remaining delay.
        match rl.check_at("src", 2_010) {
            RateDecision::Blocked { retry_after_ms } => assert_eq!(retry_after_ms, 3_000),
            other => panic!("expected block, got {:?}", other),
        }

        // After the block and the window expire, checks pass again.
        assert!(rl.check_at("src", 5_011).is_allowed());
    }

    #[test]
    fn test_window_rollover_resets_count() {
        let mut rl = limiter(2, 1_000, 0);
        assert!(rl.check_at("src", 0).is_allowed());
        assert!(rl.check_at("src", 1).is_allowed());
        assert!(!rl.check_at("src", 2).is_allowed());

        assert!(rl.check_at("src", 1_000).is_allowed());
        assert!(rl.check_at("src", 1_001).is_allowed());
    }

    #[test]
    fn test_zero_block_duration_rejects_until_rollover() {
        let mut rl = limiter(1, 1_000, 0);
        assert!(rl.check_at("src", 0).is_allowed());
        match rl.check_at("src", 400) {
            RateDecision::Blocked { retry_after_ms } => assert_eq!(retry_after_ms, 600),
            other => panic!("expected block, got {:?}", other),
        }
        assert!(rl.check_at("src", 1_000).is_allowed());
    }

    #[test]
    fn test_sources_are_independent() {
        let mut rl = limiter(1, 60_000, 1_000);
        assert!(rl.check_at("a", 0).is_allowed());
        assert!(!rl.check_at("a", 1).is_allowed());
        assert!(rl.check_at("b", 2).is_allowed());
    }

    #[test]
    fn test_reset_restores_full_budget() {
        let mut rl = limiter(3, 60_000, 300_000);
        for i in 0..4 {
            rl.check_at("src", i);
        }
        rl.reset("src");
        for i in 0..3 {
            assert!(rl.check_at("src", 100 + i).is_allowed());
        }
    }

    #[test]
    fn test_cleanup_drops_expired_entries() {
        let mut rl = limiter(1, 1_000, 2_000);
        rl.check_at("stale", 0);
        rl.check_at("fresh", 10_000);

        rl.cleanup_at(10_001);
        assert_eq!(rl.entries.len(), 1);
        assert!(rl.entries.contains_key("fresh"));
    }

    #[test]
    fn test_cleanup_keeps_blocked_entries() {
        let mut rl = limiter(1, 1_000, 100_000);
        rl.check_at("src", 0);
        rl.check_at("src", 1); // blocked until 100_001

        rl.cleanup_at(50_000);
        assert_eq!(rl.entries.len(), 1);
    }

    #[test]
    fn test_total_blocked_counter() {
        let mut rl = limiter(1, 60_000, 300_000);
        rl.check_at("src", 0);
        rl.check_at("src", 1);
        rl.check_at("src", 2);
        assert_eq!(rl.stats().total_blocked, 2);
    }
}
