//! Metrics and audit output for the request path
//!
//! Counters are keyed by (provider, model, outcome); latency lands in
//! histograms and breaker state in a gauge. Every request additionally
//! emits one structured audit event on the `audit` target, on every exit
//! path. Metric descriptions are registered once; the embedding
//! application installs its own exporter.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::Lazy;
use std::time::Duration;
use tracing::info;

use crate::routing::circuit_breaker::CircuitState;

static REGISTER: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        "gateway_requests_total",
        "Requests by provider, model and outcome"
    );
    describe_counter!("gateway_cache_hits_total", "Semantic cache hits");
    describe_counter!("gateway_cache_misses_total", "Semantic cache misses");
    describe_counter!("gateway_cost_usd_micros_total", "Accumulated cost in micro-USD");
    describe_histogram!(
        "gateway_request_duration_seconds",
        "End-to-end request duration"
    );
    describe_histogram!(
        "gateway_attempt_duration_seconds",
        "Single provider attempt duration"
    );
    describe_gauge!(
        "gateway_breaker_state",
        "Circuit breaker state (0=closed, 1=half-open, 2=open)"
    );
});

/// Ensure metric descriptions are registered
pub fn init_metrics() {
    Lazy::force(&REGISTER);
}

/// Terminal outcome of one request, as recorded in metrics and audit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    CacheHit,
    RateLimited,
    BlockedPii,
    BlockedInjection,
    NoEligibleModel,
    AllProvidersFailed,
    Cancelled,
}

impl RequestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Success => "success",
            RequestOutcome::CacheHit => "cache_hit",
            RequestOutcome::RateLimited => "rate_limited",
            RequestOutcome::BlockedPii => "blocked_pii",
            RequestOutcome::BlockedInjection => "blocked_injection",
            RequestOutcome::NoEligibleModel => "no_eligible_model",
            RequestOutcome::AllProvidersFailed => "all_providers_failed",
            RequestOutcome::Cancelled => "cancelled",
        }
    }
}

/// Count one finished request
pub fn record_outcome(provider: &str, model: &str, outcome: RequestOutcome) {
    counter!(
        "gateway_requests_total",
        "provider" => provider.to_string(),
        "model" => model.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_request_duration(duration: Duration) {
    histogram!("gateway_request_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_attempt_duration(provider: &str, duration: Duration) {
    histogram!(
        "gateway_attempt_duration_seconds",
        "provider" => provider.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    if hit {
        counter!("gateway_cache_hits_total").increment(1);
    } else {
        counter!("gateway_cache_misses_total").increment(1);
    }
}

pub fn record_cost(provider: &str, model: &str, cost_usd: f64) {
    counter!(
        "gateway_cost_usd_micros_total",
        "provider" => provider.to_string(),
        "model" => model.to_string()
    )
    .increment((cost_usd * 1_000_000.0) as u64);
}

pub fn record_breaker_state(provider: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("gateway_breaker_state", "provider" => provider.to_string()).set(value);
}

/// One structured audit line per request
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub request_id: String,
    pub tenant: Option<String>,
    pub strategy: Option<&'static str>,
    pub complexity: Option<f64>,
    pub provider_attempts: Vec<String>,
    pub cache_hit: bool,
    pub total_latency_ms: u64,
    pub total_cost_usd: f64,
    pub warnings: Vec<String>,
    pub outcome: RequestOutcome,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn emit(&self) {
        info!(
            target: "audit",
            request_id = %self.request_id,
            tenant = self.tenant.as_deref().unwrap_or("-"),
            strategy = self.strategy.unwrap_or("-"),
            complexity = self.complexity.unwrap_or(0.0),
            provider_attempts = ?self.provider_attempts,
            cache_hit = self.cache_hit,
            total_latency_ms = self.total_latency_ms,
            total_cost_usd = self.total_cost_usd,
            warnings = ?self.warnings,
            outcome = self.outcome.as_str(),
            timestamp = %self.timestamp.to_rfc3339(),
            "request completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(RequestOutcome::Success.as_str(), "success");
        assert_eq!(RequestOutcome::BlockedInjection.as_str(), "blocked_injection");
        assert_eq!(RequestOutcome::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn test_metric_recording_is_safe_without_exporter() {
        init_metrics();
        record_outcome("alpha", "m1", RequestOutcome::Success);
        record_cache_lookup(true);
        record_cache_lookup(false);
        record_cost("alpha", "m1", 0.0123);
        record_request_duration(Duration::from_millis(42));
        record_breaker_state("alpha", CircuitState::Open);
    }

    #[test]
    fn test_audit_emit_does_not_panic() {
        AuditRecord {
            request_id: "req-1".to_string(),
            tenant: Some("acme".to_string()),
            strategy: Some("balanced"),
            complexity: Some(0.3),
            provider_attempts: vec!["alpha".to_string()],
            cache_hit: false,
            total_latency_ms: 187,
            total_cost_usd: 0.004,
            warnings: vec![],
            outcome: RequestOutcome::Success,
            timestamp: Utc::now(),
        }
        .emit();
    }
}
