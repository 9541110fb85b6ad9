//! Intelligent routing over the model inventory
//!
//! Routing is a pure function of the registry, a reliability snapshot,
//! and the request: score the request's complexity, filter the inventory
//! for eligibility, score every surviving model under the active
//! strategy, and return the winner plus a ranked list of fallbacks.
//! The reliability tracker is injected read-only; the orchestrator is
//! the only writer.

pub mod circuit_breaker;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::config::RoutingConfig;
use crate::providers::{ChatRequest, RoutingPreferences};
use crate::registry::{Candidate, ModelRegistry, Tier};
use crate::reliability::ReliabilityTracker;

/// Named weighting over the four sub-scores
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    CostOptimized,
    LatencyOptimized,
    QualityOptimized,
    #[default]
    Balanced,
}

impl RoutingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStrategy::CostOptimized => "cost_optimized",
            RoutingStrategy::LatencyOptimized => "latency_optimized",
            RoutingStrategy::QualityOptimized => "quality_optimized",
            RoutingStrategy::Balanced => "balanced",
        }
    }

    fn weights(&self) -> StrategyWeights {
        match self {
            RoutingStrategy::CostOptimized => StrategyWeights {
                cost: 0.5,
                latency: 0.2,
                quality: 0.2,
                reliability: 0.1,
            },
            RoutingStrategy::LatencyOptimized => StrategyWeights {
                cost: 0.1,
                latency: 0.5,
                quality: 0.2,
                reliability: 0.2,
            },
            RoutingStrategy::QualityOptimized => StrategyWeights {
                cost: 0.1,
                latency: 0.1,
                quality: 0.6,
                reliability: 0.2,
            },
            RoutingStrategy::Balanced => StrategyWeights {
                cost: 0.25,
                latency: 0.25,
                quality: 0.3,
                reliability: 0.2,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StrategyWeights {
    cost: f64,
    latency: f64,
    quality: f64,
    reliability: f64,
}

/// Immutable outcome of one routing pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub strategy: RoutingStrategy,
    pub provider: String,
    pub model: String,
    pub complexity_score: f64,
    pub reason: String,
    /// Next-best (provider, model) pairs, best first, at most three
    pub alternatives: Vec<(String, String)>,
}

/// Keywords on the last user message that raise the complexity score
const COMPLEXITY_KEYWORDS: &[&str] = &[
    "analyze",
    "compare",
    "evaluate",
    "synthesize",
    "create",
    "design",
    "implement",
    "debug",
    "refactor",
    "optimize",
    "explain in detail",
    "step by step",
    "comprehensive",
];

/// Score a request's expected difficulty in [0, 1].
///
/// Combines message count, total content length, tool presence, system
/// prompt length, and task keywords on the last user message.
pub fn complexity_score(request: &ChatRequest) -> f64 {
    let mut score = (request.messages.len() as f64 / 20.0).min(0.2);

    let total_chars: usize = request
        .messages
        .iter()
        .map(|m| m.text().chars().count())
        .sum();
    score += (total_chars as f64 / 10_000.0).min(0.3);

    if request.has_tools() {
        score += 0.2;
    }

    let system_chars = request.system_text().chars().count();
    score += (system_chars as f64 / 5_000.0).min(0.15);

    if let Some(last_user) = request.last_user_text() {
        let lower = last_user.to_lowercase();
        for keyword in COMPLEXITY_KEYWORDS {
            score += 0.05 * lower.matches(keyword).count() as f64;
        }
    }

    score.min(1.0)
}

struct ScoredCandidate {
    provider: String,
    model: String,
    score: f64,
    cost_score: f64,
    latency_score: f64,
    quality_score: f64,
    reliability_score: f64,
}

/// Router over the model inventory
pub struct Router {
    registry: Arc<ModelRegistry>,
    reliability: Arc<ReliabilityTracker>,
    config: RoutingConfig,
}

impl Router {
    pub fn new(
        registry: Arc<ModelRegistry>,
        reliability: Arc<ReliabilityTracker>,
        config: RoutingConfig,
    ) -> Self {
        Self {
            registry,
            reliability,
            config,
        }
    }

    /// Produce the initial decision for a request
    pub fn route(&self, request: &ChatRequest) -> Option<RoutingDecision> {
        let complexity = complexity_score(request);
        self.route_excluding(request, complexity, &HashSet::new())
    }

    /// Re-route after failures, excluding the named providers. The
    /// complexity score is carried over from the initial decision rather
    /// than recomputed.
    pub fn fallback(
        &self,
        request: &ChatRequest,
        complexity: f64,
        exclude: &HashSet<String>,
    ) -> Option<RoutingDecision> {
        self.route_excluding(request, complexity, exclude)
    }

    fn route_excluding(
        &self,
        request: &ChatRequest,
        complexity: f64,
        exclude: &HashSet<String>,
    ) -> Option<RoutingDecision> {
        let mut prefs = request.preferences.clone().unwrap_or_default();
        for provider in exclude {
            if !prefs.exclude_providers.contains(provider) {
                prefs.exclude_providers.push(provider.clone());
            }
        }
        let strategy = prefs.strategy.unwrap_or(self.config.default_strategy);

        let eligible = self.registry.eligible_models(
            Some(&prefs),
            complexity,
            self.config.complexity_thresholds.simple,
        );
        if eligible.is_empty() {
            return None;
        }

        let mut scored: Vec<ScoredCandidate> = eligible
            .iter()
            .map(|candidate| self.score(candidate, strategy, complexity, &prefs))
            .collect();
        // Descending by score; lexicographic (provider, model) on ties
        // keeps selection deterministic.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| (&a.provider, &a.model).cmp(&(&b.provider, &b.model)))
        });

        let best = &scored[0];
        let reason = format!(
            "{} picked {}/{} scoring {:.3} at complexity {:.2} \
             (cost {:.2}, latency {:.2}, quality {:.2}, reliability {:.2})",
            strategy.as_str(),
            best.provider,
            best.model,
            best.score,
            complexity,
            best.cost_score,
            best.latency_score,
            best.quality_score,
            best.reliability_score,
        );
        debug!(
            strategy = strategy.as_str(),
            provider = %best.provider,
            model = %best.model,
            score = best.score,
            complexity = complexity,
            "routing decision"
        );

        let alternatives = scored
            .iter()
            .skip(1)
            .take(3)
            .map(|c| (c.provider.clone(), c.model.clone()))
            .collect();

        Some(RoutingDecision {
            strategy,
            provider: best.provider.clone(),
            model: best.model.clone(),
            complexity_score: complexity,
            reason,
            alternatives,
        })
    }

    fn score(
        &self,
        candidate: &Candidate<'_>,
        strategy: RoutingStrategy,
        complexity: f64,
        prefs: &RoutingPreferences,
    ) -> ScoredCandidate {
        let model = candidate.model;

        let cost_score =
            1.0 - ((model.cost_per_1k_input + model.cost_per_1k_output) / 0.1).min(1.0);
        let latency_score = 1.0 - (model.latency_p50_ms as f64 / 2000.0).min(1.0);

        let mut quality_score = match model.tier {
            Tier::Premium => 0.9 + 0.1 * complexity,
            Tier::Standard => 0.7 + 0.1 * complexity,
            Tier::Economy => 0.5 + 0.2 * (1.0 - complexity),
        };
        for capability in &model.capabilities {
            quality_score += match capability {
                crate::registry::Capability::Reasoning => 0.05,
                crate::registry::Capability::Coding => 0.03,
                crate::registry::Capability::LongContext => 0.02,
                _ => 0.0,
            };
        }
        let quality_score = quality_score.min(1.0);

        let reliability_score = self
            .reliability
            .get(candidate.provider, &model.name)
            .map(|s| s.success_rate)
            .unwrap_or(1.0);

        let weights = strategy.weights();
        let mut score = weights.cost * cost_score
            + weights.latency * latency_score
            + weights.quality * quality_score
            + weights.reliability * reliability_score;

        let capability_overlap = prefs
            .required_capabilities
            .iter()
            .filter(|c| model.has_capability(**c))
            .count();
        score += 0.05 * capability_overlap as f64;
        score *= candidate.weight;

        ScoredCandidate {
            provider: candidate.provider.to_string(),
            model: model.name.clone(),
            score,
            cost_score,
            latency_score,
            quality_score,
            reliability_score,
        }
    }
}
