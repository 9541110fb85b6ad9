//! Model inventory and eligibility filtering
//!
//! The registry holds the static provider/model descriptors loaded from
//! configuration and answers "which models may serve this request" given
//! the caller's preferences and the request's complexity score.

use serde::{Deserialize, Serialize};

use crate::providers::RoutingPreferences;

/// Declared quality class of a model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Premium,
    Standard,
    Economy,
}

/// Capability a model declares
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Reasoning,
    Coding,
    LongContext,
    Vision,
    Tools,
    Embeddings,
}

/// Static description of a single model. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDescriptor {
    pub name: String,
    pub tier: Tier,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    pub cost_per_1k_input: f64,
    pub cost_per_1k_output: f64,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
    pub context_window_tokens: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Static description of a provider and its models. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderDescriptor {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub models: Vec<ModelDescriptor>,
}

fn default_enabled() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

impl ModelDescriptor {
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Dollar cost of a request at the given token counts
    pub fn cost_for(&self, input_tokens: u32, output_tokens: u32) -> crate::providers::CostBreakdown {
        let input_cost = (input_tokens as f64 / 1000.0) * self.cost_per_1k_input;
        let output_cost = (output_tokens as f64 / 1000.0) * self.cost_per_1k_output;
        crate::providers::CostBreakdown {
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }
}

/// A model that survived eligibility filtering, with its provider context
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub provider: &'a str,
    pub weight: f64,
    pub model: &'a ModelDescriptor,
}

/// Process-lifetime model inventory
pub struct ModelRegistry {
    providers: Vec<ProviderDescriptor>,
}

impl ModelRegistry {
    pub fn new(providers: Vec<ProviderDescriptor>) -> Self {
        Self { providers }
    }

    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn model(&self, provider: &str, model: &str) -> Option<&ModelDescriptor> {
        self.provider(provider)
            .and_then(|p| p.models.iter().find(|m| m.name == model))
    }

    /// Models allowed to serve the request.
    ///
    /// Applies, in order: provider exclusions, required capabilities, the
    /// caller's p95 latency budget, and tier gating (premium models are
    /// excluded for simple requests unless their provider was explicitly
    /// preferred). When preferred providers are named and at least one
    /// preferred model survives, only preferred models are returned.
    pub fn eligible_models(
        &self,
        preferences: Option<&RoutingPreferences>,
        complexity: f64,
        simple_threshold: f64,
    ) -> Vec<Candidate<'_>> {
        let empty = RoutingPreferences::default();
        let prefs = preferences.unwrap_or(&empty);

        let mut survivors: Vec<Candidate<'_>> = Vec::new();
        for provider in &self.providers {
            if !provider.enabled || prefs.exclude_providers.iter().any(|p| p == &provider.name) {
                continue;
            }
            let preferred = prefs.preferred_providers.iter().any(|p| p == &provider.name);
            for model in &provider.models {
                if !model.enabled {
                    continue;
                }
                if !prefs
                    .required_capabilities
                    .iter()
                    .all(|c| model.has_capability(*c))
                {
                    continue;
                }
                if let Some(max_latency) = prefs.max_latency_ms {
                    if model.latency_p95_ms > max_latency {
                        continue;
                    }
                }
                // Tier gate: premium is off the table for simple requests
                // unless the caller asked for this provider by name.
                if complexity < simple_threshold && model.tier == Tier::Premium && !preferred {
                    continue;
                }
                survivors.push(Candidate {
                    provider: &provider.name,
                    weight: provider.weight,
                    model,
                });
            }
        }

        if !prefs.preferred_providers.is_empty() {
            let preferred: Vec<Candidate<'_>> = survivors
                .iter()
                .copied()
                .filter(|c| prefs.preferred_providers.iter().any(|p| p == c.provider))
                .collect();
            if !preferred.is_empty() {
                return preferred;
            }
        }

        survivors
    }
}
