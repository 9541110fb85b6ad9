//! Per-key fixed-window rate limiting
//!
//! Rolling 60-second windows keyed by tenant/user. Windows reset on the
//! first request after expiry; a background sweep drops entries that have
//! been idle for two windows. Token counts are accumulated per window but
//! deliberately not enforced — enforcement is an extension point.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::RateLimitConfig;

const WINDOW: Duration = Duration::from_secs(60);

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after_ms: u64 },
}

struct WindowEntry {
    requests: u32,
    tokens: u64,
    window_start: Instant,
}

/// Process-wide fixed-window limiter. Each key's entry is mutated under
/// its dashmap entry guard.
pub struct RateLimiter {
    entries: DashMap<String, WindowEntry>,
    requests_per_minute: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            requests_per_minute: config.requests_per_minute,
            window: WINDOW,
        }
    }

    #[cfg(test)]
    fn with_window(config: &RateLimitConfig, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            requests_per_minute: config.requests_per_minute,
            window,
        }
    }

    /// Admit or reject one request for the key, counting it on admission
    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| WindowEntry {
                requests: 0,
                tokens: 0,
                window_start: now,
            });

        if now.duration_since(entry.window_start) >= self.window {
            entry.requests = 0;
            entry.tokens = 0;
            entry.window_start = now;
        }

        if entry.requests >= self.requests_per_minute {
            let elapsed = now.duration_since(entry.window_start);
            let retry_after_ms = self.window.saturating_sub(elapsed).as_millis() as u64;
            debug!(key = key, retry_after_ms, "rate limit exceeded");
            return RateDecision::Limited { retry_after_ms };
        }

        entry.requests += 1;
        RateDecision::Allowed
    }

    /// Add token usage to the key's current window (informational)
    pub fn record_tokens(&self, key: &str, tokens: u64) {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| WindowEntry {
                requests: 0,
                tokens: 0,
                window_start: now,
            });
        entry.tokens += tokens;
    }

    /// Tokens recorded in the key's current window
    pub fn tokens_in_window(&self, key: &str) -> u64 {
        self.entries.get(key).map(|e| e.tokens).unwrap_or(0)
    }

    /// Drop entries idle for two full windows
    pub fn sweep(&self) {
        let max_idle = self.window * 2;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.window_start.elapsed() <= max_idle);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "swept stale rate-limit entries");
        }
    }

    /// Long-lived sweep task; the gateway owns the handle and aborts it
    /// on shutdown
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let period = limiter.window;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        })
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rpm: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: rpm,
            tokens_per_minute: 100_000,
        }
    }

    #[test]
    fn test_allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(&config(2));

        assert_eq!(limiter.check("tenant-a"), RateDecision::Allowed);
        assert_eq!(limiter.check("tenant-a"), RateDecision::Allowed);

        match limiter.check("tenant-a") {
            RateDecision::Limited { retry_after_ms } => {
                assert!(retry_after_ms > 0 && retry_after_ms <= 60_000);
            }
            RateDecision::Allowed => panic!("third request should be limited"),
        }
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(&config(1));

        assert_eq!(limiter.check("tenant-a"), RateDecision::Allowed);
        assert_eq!(limiter.check("tenant-b"), RateDecision::Allowed);
        assert!(matches!(
            limiter.check("tenant-a"),
            RateDecision::Limited { .. }
        ));
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = RateLimiter::with_window(&config(1), Duration::from_millis(50));

        assert_eq!(limiter.check("tenant-a"), RateDecision::Allowed);
        assert!(matches!(
            limiter.check("tenant-a"),
            RateDecision::Limited { .. }
        ));

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(limiter.check("tenant-a"), RateDecision::Allowed);
    }

    #[test]
    fn test_token_accounting() {
        let limiter = RateLimiter::new(&config(10));

        limiter.check("tenant-a");
        limiter.record_tokens("tenant-a", 1200);
        limiter.record_tokens("tenant-a", 300);

        assert_eq!(limiter.tokens_in_window("tenant-a"), 1500);
        // Token accumulation never rejects.
        assert_eq!(limiter.check("tenant-a"), RateDecision::Allowed);
    }

    #[test]
    fn test_sweep_drops_stale_entries() {
        let limiter = RateLimiter::with_window(&config(10), Duration::from_millis(20));

        limiter.check("tenant-a");
        assert_eq!(limiter.entry_count(), 1);

        std::thread::sleep(Duration::from_millis(60));
        limiter.sweep();
        assert_eq!(limiter.entry_count(), 0);
    }
}
