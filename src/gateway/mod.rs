//! Gateway orchestrator
//!
//! Owns the end-to-end request pipeline: rate-limit check, cache lookup,
//! security pre-check, routing, breaker-gated dispatch with a shared
//! deadline, reliability/breaker feedback, and fallback across distinct
//! providers. Every exit path closes the request span, emits metrics and
//! writes one audit record.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::cache::{InMemoryCache, ResponseCache};
use crate::config::{ConfigError, GatewayConfig};
use crate::error::{AttemptSummary, GatewayError, Result};
use crate::observability::{self, AuditRecord, RequestOutcome};
use crate::providers::{AdapterRegistry, ChatRequest, GatewayResponse, ProviderAdapter};
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::registry::ModelRegistry;
use crate::reliability::{ReliabilityStats, ReliabilityTracker};
use crate::routing::circuit_breaker::{BreakerRegistry, CircuitState};
use crate::routing::{Router, RoutingDecision};
use crate::security::SecurityGuard;

/// Builder assembling a [`Gateway`] from configuration, provider
/// adapters, and an optional cache backend
pub struct GatewayBuilder {
    config: GatewayConfig,
    adapters: AdapterRegistry,
    cache: Option<Arc<dyn ResponseCache>>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            adapters: AdapterRegistry::new(),
            cache: None,
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.register(adapter);
        self
    }

    /// Install a cache backend; the bundled in-memory cache is used when
    /// caching is enabled and no backend is supplied
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validate configuration and assemble the gateway. Must run inside
    /// a tokio runtime: the rate-limiter sweep task starts here.
    pub fn build(self) -> Result<Gateway> {
        self.config.validate()?;
        for provider in &self.config.providers {
            if provider.enabled && !self.adapters.contains(&provider.name) {
                return Err(GatewayError::Config(ConfigError::Invalid(format!(
                    "no adapter registered for enabled provider {:?}",
                    provider.name
                ))));
            }
        }

        observability::init_metrics();

        let guard = SecurityGuard::new(&self.config.security)?;
        let registry = Arc::new(ModelRegistry::new(self.config.providers.clone()));
        let reliability = Arc::new(ReliabilityTracker::new());
        let router = Router::new(
            Arc::clone(&registry),
            Arc::clone(&reliability),
            self.config.routing.clone(),
        );

        let breakers = BreakerRegistry::new(self.config.breaker.default_config());
        for name in self.config.breaker.overrides.keys() {
            if let Some(config) = self.config.breaker.config_for(name) {
                breakers.set_override(name.clone(), config);
            }
        }

        let limiter = Arc::new(RateLimiter::new(&self.config.rate_limit));
        let sweeper = limiter.spawn_sweeper();

        let cache = if self.config.cache.enabled {
            Some(self.cache.unwrap_or_else(|| {
                Arc::new(InMemoryCache::new(&self.config.cache)) as Arc<dyn ResponseCache>
            }))
        } else {
            None
        };

        Ok(Gateway {
            config: self.config,
            registry,
            router,
            reliability,
            breakers,
            limiter,
            guard,
            adapters: self.adapters,
            cache,
            ledger: CostLedger::default(),
            sweeper: Mutex::new(Some(sweeper)),
        })
    }
}

/// Advisory spend tracking against configured budgets
#[derive(Default)]
struct CostLedger {
    spent_micros: AtomicU64,
    daily_warned: AtomicBool,
    monthly_warned: AtomicBool,
}

impl CostLedger {
    fn add(&self, cost_usd: f64) -> f64 {
        let micros = (cost_usd * 1_000_000.0) as u64;
        let total = self.spent_micros.fetch_add(micros, Ordering::Relaxed) + micros;
        total as f64 / 1_000_000.0
    }
}

/// Multi-provider LLM gateway. One instance serves many concurrent
/// requests; shared state lives behind per-key critical sections.
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<ModelRegistry>,
    router: Router,
    reliability: Arc<ReliabilityTracker>,
    breakers: BreakerRegistry,
    limiter: Arc<RateLimiter>,
    guard: SecurityGuard,
    adapters: AdapterRegistry,
    cache: Option<Arc<dyn ResponseCache>>,
    ledger: CostLedger,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Per-request bookkeeping for the audit record
struct RequestContext {
    request_id: String,
    tenant: Option<String>,
    started: Instant,
    strategy: Option<&'static str>,
    complexity: Option<f64>,
    provider_attempts: Vec<String>,
    cache_hit: bool,
    warnings: Vec<String>,
    total_cost: f64,
}

impl RequestContext {
    fn finish(&self, outcome: RequestOutcome, provider: &str, model: &str) {
        observability::record_outcome(provider, model, outcome);
        AuditRecord {
            request_id: self.request_id.clone(),
            tenant: self.tenant.clone(),
            strategy: self.strategy,
            complexity: self.complexity,
            provider_attempts: self.provider_attempts.clone(),
            cache_hit: self.cache_hit,
            total_latency_ms: self.started.elapsed().as_millis() as u64,
            total_cost_usd: self.total_cost,
            warnings: self.warnings.clone(),
            outcome,
            timestamp: Utc::now(),
        }
        .emit();
    }
}

impl Gateway {
    /// Entry point: run one request through the full pipeline
    pub async fn chat(&self, request: ChatRequest) -> Result<GatewayResponse> {
        let started = Instant::now();
        let request_id = request
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let tenant = request.metadata.as_ref().and_then(|m| m.tenant_id.clone());

        let span = info_span!(
            "gateway_request",
            request_id = %request_id,
            tenant = tenant.as_deref().unwrap_or("-"),
        );
        let mut ctx = RequestContext {
            request_id,
            tenant,
            started,
            strategy: None,
            complexity: None,
            provider_attempts: Vec::new(),
            cache_hit: false,
            warnings: Vec::new(),
            total_cost: 0.0,
        };

        let result = self.execute(request, &mut ctx).instrument(span).await;
        observability::record_request_duration(started.elapsed());
        result
    }

    async fn execute(
        &self,
        request: ChatRequest,
        ctx: &mut RequestContext,
    ) -> Result<GatewayResponse> {
        // Rate-limit check on the caller key.
        let rate_key = ctx.tenant.clone().unwrap_or_else(|| "anonymous".to_string());
        if let RateDecision::Limited { retry_after_ms } = self.limiter.check(&rate_key) {
            ctx.finish(RequestOutcome::RateLimited, "-", "-");
            return Err(GatewayError::RateLimited { retry_after_ms });
        }

        // Cache lookup; backend failures degrade to a miss.
        if let Some(cache) = &self.cache {
            match cache.lookup(&request).await {
                Ok(Some(mut cached)) => {
                    cached.cached = true;
                    cached.latency_ms = ctx.started.elapsed().as_millis() as u64;
                    observability::record_cache_lookup(true);
                    ctx.cache_hit = true;
                    ctx.finish(
                        RequestOutcome::CacheHit,
                        &cached.provider_used,
                        &cached.model_used,
                    );
                    return Ok(cached);
                }
                Ok(None) => observability::record_cache_lookup(false),
                Err(err) => {
                    warn!(error = %err, "cache lookup failed, treating as miss");
                    observability::record_cache_lookup(false);
                }
            }
        }

        // Security pre-check.
        let check = self.guard.check(&request);
        if check.blocked {
            let reason = check
                .reason
                .unwrap_or_else(|| "blocked by security policy".to_string());
            let outcome = if reason.starts_with("PII") {
                RequestOutcome::BlockedPii
            } else {
                RequestOutcome::BlockedInjection
            };
            ctx.warnings = check.warnings;
            ctx.finish(outcome, "-", "-");
            return Err(GatewayError::SecurityBlocked { reason });
        }
        let mut warnings = check.warnings;
        let sanitized = check.sanitized_request;
        // Masked content is what routing sees and providers receive; the
        // original request stays the cache key.
        let dispatch_request = sanitized.as_ref().unwrap_or(&request);

        // Initial routing decision.
        let Some(mut decision) = self.router.route(dispatch_request) else {
            ctx.finish(RequestOutcome::NoEligibleModel, "-", "-");
            return Err(GatewayError::NoEligibleModel);
        };
        ctx.strategy = Some(decision.strategy.as_str());
        ctx.complexity = Some(decision.complexity_score);
        let complexity = decision.complexity_score;

        // One deadline shared by every fallback hop.
        let deadline =
            Duration::from_millis(request.deadline_ms.unwrap_or(self.config.default_timeout_ms));

        let mut attempts: Vec<AttemptSummary> = Vec::new();
        let mut failed: HashSet<String> = HashSet::new();
        let mut alternatives: VecDeque<(String, String)> =
            decision.alternatives.iter().cloned().collect();

        loop {
            let remaining = match deadline.checked_sub(ctx.started.elapsed()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => {
                    ctx.finish(RequestOutcome::Cancelled, &decision.provider, &decision.model);
                    return Err(GatewayError::Cancelled {
                        elapsed_ms: ctx.started.elapsed().as_millis() as u64,
                    });
                }
            };

            let provider = decision.provider.clone();
            let model = decision.model.clone();
            ctx.provider_attempts.push(provider.clone());

            if !self.breakers.admit(&provider) {
                warn!(provider = %provider, "circuit breaker rejected dispatch");
                attempts.push(AttemptSummary {
                    provider: provider.clone(),
                    model,
                    error: "circuit breaker open".to_string(),
                    latency_ms: 0,
                });
                failed.insert(provider);
            } else {
                let attempt_started = Instant::now();
                let outcome = match self.adapters.get(&provider) {
                    Some(adapter) => {
                        tokio::time::timeout(remaining, async {
                            adapter.complete(dispatch_request, &model).await
                        })
                        .await
                    }
                    None => Ok(Err(crate::providers::AdapterError::Transport {
                        message: "no adapter registered".to_string(),
                        retryable: false,
                    })),
                };
                let latency = attempt_started.elapsed();
                let latency_ms = latency.as_millis() as u64;
                observability::record_attempt_duration(&provider, latency);

                match outcome {
                    Ok(Ok(completion)) => {
                        self.breakers.on_result(&provider, true);
                        self.reliability.record(&provider, &model, true, latency_ms);

                        let (content, output_warnings) =
                            self.guard.sanitize_output(&completion.content);
                        warnings.extend(output_warnings);

                        let cost = self
                            .registry
                            .model(&provider, &model)
                            .map(|m| {
                                m.cost_for(
                                    completion.usage.input_tokens,
                                    completion.usage.output_tokens,
                                )
                            })
                            .unwrap_or_default();
                        self.limiter
                            .record_tokens(&rate_key, u64::from(completion.usage.total()));
                        observability::record_cost(&provider, &model, cost.total_cost);
                        self.check_budgets(cost.total_cost);

                        let response = GatewayResponse {
                            content,
                            usage: completion.usage,
                            cost,
                            latency_ms: ctx.started.elapsed().as_millis() as u64,
                            cached: false,
                            provider_used: provider.clone(),
                            model_used: model.clone(),
                            routing: decision.clone(),
                            warnings: warnings.clone(),
                        };

                        if let Some(cache) = &self.cache {
                            if let Err(err) = cache.store(&request, &response).await {
                                warn!(error = %err, "cache store failed");
                            }
                        }

                        ctx.warnings = warnings;
                        ctx.total_cost = cost.total_cost;
                        ctx.finish(RequestOutcome::Success, &provider, &model);
                        return Ok(response);
                    }
                    Ok(Err(err)) => {
                        self.breakers.on_result(&provider, false);
                        self.reliability.record(&provider, &model, false, latency_ms);
                        warn!(
                            provider = %provider,
                            model = %model,
                            error = %err,
                            retryable = err.retryable(),
                            latency_ms,
                            "provider attempt failed"
                        );
                        attempts.push(AttemptSummary {
                            provider: provider.clone(),
                            model,
                            error: err.to_string(),
                            latency_ms,
                        });
                        failed.insert(provider);
                    }
                    Err(_) => {
                        // Deadline expired mid-attempt; the in-flight call
                        // was dropped. The loop head folds this into
                        // `Cancelled`.
                        self.breakers.on_result(&provider, false);
                        self.reliability.record(&provider, &model, false, latency_ms);
                        warn!(provider = %provider, model = %model, latency_ms, "attempt cancelled at deadline");
                        attempts.push(AttemptSummary {
                            provider: provider.clone(),
                            model,
                            error: format!("cancelled after {latency_ms}ms"),
                            latency_ms,
                        });
                        failed.insert(provider);
                    }
                }
            }

            if !self.config.routing.fallback_enabled {
                ctx.finish(RequestOutcome::AllProvidersFailed, "-", "-");
                return Err(GatewayError::AllProvidersFailed { attempts });
            }

            // Next hop: ranked alternatives from the current decision
            // first, then a fresh routing pass excluding every failed
            // provider.
            let next_alternative = loop {
                match alternatives.pop_front() {
                    Some((p, m)) if !failed.contains(&p) => break Some((p, m)),
                    Some(_) => continue,
                    None => break None,
                }
            };

            decision = match next_alternative {
                Some((p, m)) => RoutingDecision {
                    strategy: decision.strategy,
                    provider: p.clone(),
                    model: m.clone(),
                    complexity_score: complexity,
                    reason: format!("fallback to ranked alternative {p}/{m}"),
                    alternatives: Vec::new(),
                },
                None => match self.router.fallback(dispatch_request, complexity, &failed) {
                    Some(next) => {
                        alternatives = next.alternatives.iter().cloned().collect();
                        next
                    }
                    None => {
                        ctx.finish(RequestOutcome::AllProvidersFailed, "-", "-");
                        return Err(GatewayError::AllProvidersFailed { attempts });
                    }
                },
            };
        }
    }

    fn check_budgets(&self, cost_usd: f64) {
        let total = self.ledger.add(cost_usd);
        let budgets = self.config.cost.budgets;
        if let Some(daily) = budgets.daily {
            if total > daily && !self.ledger.daily_warned.swap(true, Ordering::Relaxed) {
                warn!(total_usd = total, budget_usd = daily, "daily cost budget exceeded");
            }
        }
        if let Some(monthly) = budgets.monthly {
            if total > monthly && !self.ledger.monthly_warned.swap(true, Ordering::Relaxed) {
                warn!(total_usd = total, budget_usd = monthly, "monthly cost budget exceeded");
            }
        }
    }

    /// Snapshot of learned reliability per (provider, model)
    pub fn reliability_snapshot(&self) -> Vec<((String, String), ReliabilityStats)> {
        self.reliability.snapshot()
    }

    /// Current breaker state per provider that has seen traffic
    pub fn breaker_states(&self) -> Vec<(String, CircuitState)> {
        self.breakers.states()
    }

    /// Stop background work. Called automatically on drop.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}
