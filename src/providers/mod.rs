// Provider abstraction layer.
// The gateway never speaks a provider wire protocol itself; concrete
// HTTP/streaming adapters implement `ProviderAdapter` and are registered
// at build time.

pub mod types;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub use types::*;

/// Errors surfaced by provider adapters
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    #[error("transport failure: {message}")]
    Transport { message: String, retryable: bool },

    #[error("provider returned status {status}: {message}")]
    Api {
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("rate limited by provider: {message}")]
    UpstreamRateLimited { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("model not available: {model}")]
    ModelNotAvailable { model: String },

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("streaming is not supported by this adapter")]
    StreamingUnsupported,
}

impl AdapterError {
    /// Whether retrying the same request against this provider may succeed
    pub fn retryable(&self) -> bool {
        match self {
            AdapterError::Transport { retryable, .. } => *retryable,
            AdapterError::Api { retryable, .. } => *retryable,
            AdapterError::UpstreamRateLimited { .. } => true,
            AdapterError::Timeout { .. } => true,
            AdapterError::InvalidRequest { .. } => false,
            AdapterError::ModelNotAvailable { .. } => false,
            AdapterError::StreamingUnsupported => false,
        }
    }
}

/// Lazy sequence of streaming deltas; the first item carries the
/// first-token latency signal
pub type CompletionStream = BoxStream<'static, Result<StreamChunk, AdapterError>>;

/// Contract implemented by concrete provider integrations.
///
/// Adapters must be cancel-safe: the gateway drops the in-flight future
/// when the request deadline expires.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name as it appears in the model registry
    fn name(&self) -> &str;

    /// Execute a chat completion against the given model
    async fn complete(
        &self,
        request: &ChatRequest,
        model: &str,
    ) -> Result<Completion, AdapterError>;

    /// Execute a streaming completion. Non-streaming adapters keep the
    /// default.
    async fn stream(
        &self,
        _request: &ChatRequest,
        _model: &str,
    ) -> Result<CompletionStream, AdapterError> {
        Err(AdapterError::StreamingUnsupported)
    }
}

/// Registry of adapters keyed by provider name
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Register an adapter under its own name
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider).cloned()
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.adapters.contains_key(provider)
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoAdapter;

    #[async_trait]
    impl ProviderAdapter for EchoAdapter {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: &ChatRequest,
            _model: &str,
        ) -> Result<Completion, AdapterError> {
            Ok(Completion {
                content: request.full_text(),
                usage: TokenUsage::default(),
                finish_reason: FinishReason::Stop,
            })
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(EchoAdapter));

        assert!(registry.contains("echo"));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_streaming_defaults_to_unsupported() {
        let adapter = EchoAdapter;
        let request = ChatRequest::new(vec![Message::user("hi")]);

        let result = adapter.stream(&request, "echo-1").await;
        assert!(matches!(result, Err(AdapterError::StreamingUnsupported)));
    }

    #[test]
    fn test_retryable_hints() {
        assert!(AdapterError::Timeout { timeout_ms: 1000 }.retryable());
        assert!(AdapterError::UpstreamRateLimited {
            message: "slow down".to_string()
        }
        .retryable());
        assert!(!AdapterError::InvalidRequest {
            message: "bad schema".to_string()
        }
        .retryable());
    }
}
