//! Multi-provider LLM gateway
//!
//! A library-style request pipeline for dispatching unified chat
//! completions across several upstream model providers:
//! - Intelligent routing: complexity scoring, tiered eligibility, and
//!   strategy-weighted model selection with ranked fallbacks
//! - Security pre-checks: PII detection (block/mask/warn), prompt
//!   injection scoring, output sanitization
//! - Circuit-breaker protected dispatch with automatic failover under a
//!   single shared deadline
//! - Online reliability learning feeding back into routing
//! - Per-tenant fixed-window rate limiting
//! - Structured tracing, metrics, and audit output
//!
//! Provider wire adapters and semantic cache backends are external
//! collaborators implementing [`providers::ProviderAdapter`] and
//! [`cache::ResponseCache`].

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod observability;
pub mod providers;
pub mod rate_limit;
pub mod registry;
pub mod reliability;
pub mod routing;
pub mod security;

pub use config::GatewayConfig;
pub use error::{AttemptSummary, GatewayError};
pub use gateway::{Gateway, GatewayBuilder};
pub use providers::{
    ChatRequest, Completion, GatewayResponse, Message, MessageContent, ProviderAdapter, Role,
    RoutingPreferences, TokenUsage,
};
pub use routing::{RoutingDecision, RoutingStrategy};
