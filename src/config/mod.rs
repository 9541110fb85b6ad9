//! Typed gateway configuration
//!
//! Every recognized option is an explicit record validated at load;
//! unknown keys are rejected. Configuration can be supplied directly,
//! parsed from TOML, or layered from a file plus `LLM_GATEWAY_*`
//! environment overrides.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::registry::ProviderDescriptor;
use crate::routing::circuit_breaker::BreakerConfig;
use crate::routing::RoutingStrategy;

/// Errors produced while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid pattern {label:?}: {source}")]
    Pattern {
        label: String,
        source: regex::Error,
    },
}

/// Root configuration record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GatewayConfig {
    pub providers: Vec<ProviderDescriptor>,
    pub routing: RoutingConfig,
    pub cache: CacheConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub breaker: BreakerSettings,
    pub cost: CostConfig,
    /// Default dispatch deadline when the request carries none
    pub default_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            routing: RoutingConfig::default(),
            cache: CacheConfig::default(),
            security: SecurityConfig::default(),
            rate_limit: RateLimitConfig::default(),
            breaker: BreakerSettings::default(),
            cost: CostConfig::default(),
            default_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RoutingConfig {
    pub default_strategy: RoutingStrategy,
    pub complexity_thresholds: ComplexityThresholds,
    pub fallback_enabled: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_strategy: RoutingStrategy::Balanced,
            complexity_thresholds: ComplexityThresholds::default(),
            fallback_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ComplexityThresholds {
    pub simple: f64,
    pub complex: f64,
}

impl Default for ComplexityThresholds {
    fn default() -> Self {
        Self {
            simple: 0.3,
            complex: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub semantic_similarity_threshold: f64,
    pub max_entries: u64,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            semantic_similarity_threshold: 0.95,
            max_entries: 1000,
            ttl_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SecurityConfig {
    pub pii_detection: PiiConfig,
    pub prompt_injection: InjectionConfig,
    pub output_sanitization: OutputSanitizationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PiiConfig {
    pub enabled: bool,
    /// Labeled patterns; empty means the built-in set
    pub patterns: Vec<PiiPatternConfig>,
    pub action: PiiAction,
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: Vec::new(),
            action: PiiAction::Mask,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PiiPatternConfig {
    pub label: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PiiAction {
    Block,
    Mask,
    Warn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct InjectionConfig {
    pub enabled: bool,
    pub action: InjectionAction,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            action: InjectionAction::Block,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InjectionAction {
    Block,
    Warn,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OutputSanitizationConfig {
    pub enabled: bool,
    pub blocked_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            tokens_per_minute: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub open_duration_ms: u64,
    pub half_open_successes: u32,
    /// Per-provider overrides of the global settings
    pub overrides: HashMap<String, BreakerOverride>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration_ms: 30_000,
            half_open_successes: 2,
            overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BreakerOverride {
    pub failure_threshold: Option<u32>,
    pub open_duration_ms: Option<u64>,
    pub half_open_successes: Option<u32>,
}

impl BreakerSettings {
    pub fn default_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            open_duration: Duration::from_millis(self.open_duration_ms),
            half_open_successes: self.half_open_successes,
        }
    }

    pub fn config_for(&self, provider: &str) -> Option<BreakerConfig> {
        self.overrides.get(provider).map(|o| BreakerConfig {
            failure_threshold: o.failure_threshold.unwrap_or(self.failure_threshold),
            open_duration: Duration::from_millis(
                o.open_duration_ms.unwrap_or(self.open_duration_ms),
            ),
            half_open_successes: o.half_open_successes.unwrap_or(self.half_open_successes),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CostConfig {
    pub budgets: CostBudgets,
}

/// Advisory budgets: exceeding one raises a warning, never a rejection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CostBudgets {
    pub daily: Option<f64>,
    pub monthly: Option<f64>,
}

impl GatewayConfig {
    /// Load from a TOML file layered with `LLM_GATEWAY_*` env overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: GatewayConfig = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("LLM_GATEWAY_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from an inline TOML document
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = Figment::new().merge(Toml::string(toml)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent values before any component is built
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self
            .providers
            .iter()
            .any(|p| p.enabled && p.models.iter().any(|m| m.enabled))
        {
            return Err(ConfigError::Invalid(
                "at least one enabled provider with an enabled model is required".to_string(),
            ));
        }
        for provider in &self.providers {
            if provider.weight <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "provider {:?} weight must be positive",
                    provider.name
                )));
            }
            for model in &provider.models {
                if model.cost_per_1k_input < 0.0 || model.cost_per_1k_output < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "model {:?} has negative cost",
                        model.name
                    )));
                }
            }
        }

        let thresholds = &self.routing.complexity_thresholds;
        if !(0.0..=1.0).contains(&thresholds.simple)
            || !(0.0..=1.0).contains(&thresholds.complex)
            || thresholds.simple > thresholds.complex
        {
            return Err(ConfigError::Invalid(
                "complexity thresholds must satisfy 0 <= simple <= complex <= 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.cache.semantic_similarity_threshold) {
            return Err(ConfigError::Invalid(
                "cache.semantic_similarity_threshold must be within [0, 1]".to_string(),
            ));
        }

        if self.rate_limit.requests_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.requests_per_minute must be at least 1".to_string(),
            ));
        }

        if self.breaker.failure_threshold == 0 || self.breaker.half_open_successes == 0 {
            return Err(ConfigError::Invalid(
                "breaker thresholds must be at least 1".to_string(),
            ));
        }

        if self.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "default_timeout_ms must be positive".to_string(),
            ));
        }

        // Compile every configured pattern now so bad regexes fail at
        // load rather than on the first request.
        for entry in &self.security.pii_detection.patterns {
            regex::Regex::new(&entry.pattern).map_err(|source| ConfigError::Pattern {
                label: entry.label.clone(),
                source,
            })?;
        }
        for pattern in &self.security.output_sanitization.blocked_patterns {
            regex::Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                label: format!("output:{pattern}"),
                source,
            })?;
        }

        Ok(())
    }
}
