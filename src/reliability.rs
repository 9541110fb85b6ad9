//! Online reliability tracking per (provider, model)
//!
//! Reliability is re-learned from live traffic: an exponential moving
//! average over latency and a bounded recent-error counter that drives
//! the success rate used by the router. State is process-lifetime and
//! not persisted.

use dashmap::DashMap;
use tracing::debug;

/// Smoothing factor toward the newest latency observation
const LATENCY_EMA_ALPHA: f64 = 0.1;

/// Ceiling on the recent-error counter
const MAX_RECENT_ERRORS: u32 = 10;

/// Snapshot of a single (provider, model) record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReliabilityStats {
    /// Derived success rate, floored at 0.1
    pub success_rate: f64,
    /// EMA of observed latency in milliseconds
    pub avg_latency_ms: f64,
    /// Total recorded observations
    pub total_requests: u64,
    /// Error counter: +1 per failure, -1 per success, clamped to [0, 10]
    pub recent_errors: u32,
}

impl Default for ReliabilityStats {
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            avg_latency_ms: 0.0,
            total_requests: 0,
            recent_errors: 0,
        }
    }
}

/// Process-wide reliability map. `record` is linearizable per key: the
/// dashmap entry guard holds the shard lock for the whole update.
#[derive(Default)]
pub struct ReliabilityTracker {
    records: DashMap<(String, String), ReliabilityStats>,
}

impl ReliabilityTracker {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Fold one observation into the record for (provider, model)
    pub fn record(&self, provider: &str, model: &str, success: bool, latency_ms: u64) {
        let key = (provider.to_string(), model.to_string());
        let mut entry = self.records.entry(key).or_default();
        let stats = entry.value_mut();

        stats.total_requests += 1;
        if stats.total_requests == 1 {
            stats.avg_latency_ms = latency_ms as f64;
        } else {
            stats.avg_latency_ms = (1.0 - LATENCY_EMA_ALPHA) * stats.avg_latency_ms
                + LATENCY_EMA_ALPHA * latency_ms as f64;
        }

        if success {
            stats.recent_errors = stats.recent_errors.saturating_sub(1);
        } else {
            stats.recent_errors = (stats.recent_errors + 1).min(MAX_RECENT_ERRORS);
        }
        stats.success_rate =
            (1.0 - f64::from(stats.recent_errors) / f64::from(MAX_RECENT_ERRORS)).max(0.1);

        debug!(
            provider = provider,
            model = model,
            success = success,
            latency_ms = latency_ms,
            success_rate = stats.success_rate,
            "recorded reliability observation"
        );
    }

    /// Snapshot of one record, if any observation has been made
    pub fn get(&self, provider: &str, model: &str) -> Option<ReliabilityStats> {
        self.records
            .get(&(provider.to_string(), model.to_string()))
            .map(|r| *r.value())
    }

    /// Snapshot of every record, for operational introspection
    pub fn snapshot(&self) -> Vec<((String, String), ReliabilityStats)> {
        self.records
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect()
    }
}
