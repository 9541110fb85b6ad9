//! Per-provider circuit breakers
//!
//! Three-state breaker (closed / open / half-open) guarding every dispatch.
//! An open breaker rejects until its expiry; half-open admits a single
//! probe at a time and closes again after the configured number of probe
//! successes.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::observability;

/// Breaker tuning for one provider
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker
    pub failure_threshold: u32,
    /// How long the breaker stays open before probing
    pub open_duration: Duration,
    /// Probe successes required to close again
    pub half_open_successes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            half_open_successes: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    open_expiry: Option<Instant>,
    probe_in_flight: bool,
    probes_remaining: u32,
}

/// Breaker for a single provider. All transitions run inside one critical
/// section.
pub struct CircuitBreaker {
    provider: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            provider: provider.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                open_expiry: None,
                probe_in_flight: false,
                probes_remaining: 0,
            }),
        }
    }

    /// Whether a request may be dispatched right now.
    ///
    /// Open breakers whose expiry has passed transition to half-open and
    /// admit the caller as the probe. In half-open, at most one probe is
    /// in flight.
    pub fn admit(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let expired = inner
                    .open_expiry
                    .is_some_and(|expiry| Instant::now() >= expiry);
                if expired {
                    inner.state = CircuitState::HalfOpen;
                    inner.probes_remaining = self.config.half_open_successes;
                    inner.probe_in_flight = true;
                    info!(provider = %self.provider, "breaker half-open, admitting probe");
                    observability::record_breaker_state(&self.provider, CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Feed back the outcome of an admitted dispatch
    pub fn on_result(&self, success: bool) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                if success {
                    inner.consecutive_failures = 0;
                } else {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.failure_threshold {
                        self.trip(&mut inner);
                    }
                }
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                if success {
                    inner.probes_remaining = inner.probes_remaining.saturating_sub(1);
                    if inner.probes_remaining == 0 {
                        inner.state = CircuitState::Closed;
                        inner.consecutive_failures = 0;
                        inner.open_expiry = None;
                        info!(provider = %self.provider, "breaker closed after recovery probes");
                        observability::record_breaker_state(&self.provider, CircuitState::Closed);
                    }
                } else {
                    self.trip(&mut inner);
                }
            }
            // A result landing after the breaker already tripped carries no
            // new information for the state machine.
            CircuitState::Open => {}
        }
    }

    fn trip(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.open_expiry = Some(Instant::now() + self.config.open_duration);
        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;
        warn!(
            provider = %self.provider,
            open_ms = self.config.open_duration.as_millis() as u64,
            "breaker opened"
        );
        observability::record_breaker_state(&self.provider, CircuitState::Open);
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }
}

/// Registry of breakers keyed by provider, with a global default config
/// and optional per-provider overrides.
pub struct BreakerRegistry {
    default_config: BreakerConfig,
    overrides: DashMap<String, BreakerConfig>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            default_config,
            overrides: DashMap::new(),
            breakers: DashMap::new(),
        }
    }

    pub fn set_override(&self, provider: impl Into<String>, config: BreakerConfig) {
        self.overrides.insert(provider.into(), config);
    }

    fn breaker(&self, provider: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(provider.to_string())
            .or_insert_with(|| {
                let config = self
                    .overrides
                    .get(provider)
                    .map(|c| *c.value())
                    .unwrap_or(self.default_config);
                Arc::new(CircuitBreaker::new(provider, config))
            })
            .clone()
    }

    pub fn admit(&self, provider: &str) -> bool {
        self.breaker(provider).admit()
    }

    pub fn on_result(&self, provider: &str, success: bool) {
        self.breaker(provider).on_result(success);
    }

    pub fn state(&self, provider: &str) -> CircuitState {
        self.breaker(provider).state()
    }

    /// State of every breaker that has seen traffic
    pub fn states(&self) -> Vec<(String, CircuitState)> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect()
    }
}
