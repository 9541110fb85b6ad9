//! Caller-facing error taxonomy

use thiserror::Error;

use crate::config::ConfigError;

/// Summary of one failed dispatch attempt, carried by
/// [`GatewayError::AllProvidersFailed`]
#[derive(Debug, Clone)]
pub struct AttemptSummary {
    pub provider: String,
    pub model: String,
    pub error: String,
    pub latency_ms: u64,
}

impl std::fmt::Display for AttemptSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} failed after {}ms: {}",
            self.provider, self.model, self.latency_ms, self.error
        )
    }
}

/// Errors surfaced to the gateway caller
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The caller exceeded its per-key window; retry after the delay
    #[error("rate limited; retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Blocked by the security guard; not retryable
    #[error("request blocked: {reason}")]
    SecurityBlocked { reason: String },

    /// No model satisfied the request's constraints
    #[error("no eligible model for this request")]
    NoEligibleModel,

    /// Every attempted provider failed or was breaker-rejected
    #[error("all providers failed after {} attempts", attempts.len())]
    AllProvidersFailed { attempts: Vec<AttemptSummary> },

    /// The request deadline expired before any attempt succeeded
    #[error("request cancelled after {elapsed_ms}ms deadline")]
    Cancelled { elapsed_ms: u64 },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_summary_display() {
        let summary = AttemptSummary {
            provider: "alpha".to_string(),
            model: "m1".to_string(),
            error: "connection reset".to_string(),
            latency_ms: 320,
        };
        assert_eq!(
            summary.to_string(),
            "alpha/m1 failed after 320ms: connection reset"
        );
    }

    #[test]
    fn test_error_messages() {
        let err = GatewayError::RateLimited {
            retry_after_ms: 42_000,
        };
        assert!(err.to_string().contains("42000ms"));

        let err = GatewayError::AllProvidersFailed {
            attempts: vec![
                AttemptSummary {
                    provider: "a".to_string(),
                    model: "m".to_string(),
                    error: "boom".to_string(),
                    latency_ms: 10,
                },
                AttemptSummary {
                    provider: "b".to_string(),
                    model: "m".to_string(),
                    error: "boom".to_string(),
                    latency_ms: 12,
                },
            ],
        };
        assert!(err.to_string().contains("2 attempts"));
    }
}
