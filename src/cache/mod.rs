//! Response cache contract and bundled in-memory backend
//!
//! The gateway treats the cache as an external collaborator: lookups and
//! stores are best-effort, and any backend error is logged and treated as
//! a miss. The bundled backend keys exact request content (SHA-256 over
//! messages and tools) in a Moka TTL cache; a semantic backend can be
//! swapped in through the same trait.

use async_trait::async_trait;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::CacheConfig;
use crate::providers::{ChatRequest, GatewayResponse};

/// Errors reaching the cache backend. Never fatal to the request path.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Backend(String),

    #[error("cached payload could not be decoded: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Contract for response caches. Implementations must be safe to call
/// from concurrent requests.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn lookup(&self, request: &ChatRequest) -> Result<Option<GatewayResponse>, CacheError>;

    async fn store(
        &self,
        request: &ChatRequest,
        response: &GatewayResponse,
    ) -> Result<(), CacheError>;
}

/// Cache key over the fields that determine a response: message roles and
/// content, plus attached tool names. Metadata and routing preferences do
/// not affect the key.
pub fn request_key(request: &ChatRequest) -> String {
    let mut hasher = Sha256::new();
    for message in &request.messages {
        hasher.update(format!("{:?}", message.role).as_bytes());
        hasher.update(b":");
        hasher.update(message.text().as_bytes());
        hasher.update(b"|");
    }
    if let Some(tools) = &request.tools {
        for tool in tools {
            hasher.update(tool.name.as_bytes());
            hasher.update(b";");
        }
    }
    hex::encode(hasher.finalize())
}

/// Exact-match in-memory backend
pub struct InMemoryCache {
    cache: Cache<String, Arc<GatewayResponse>>,
}

impl InMemoryCache {
    pub fn new(config: &CacheConfig) -> Self {
        info!(
            max_entries = config.max_entries,
            ttl_seconds = config.ttl_seconds,
            "initializing in-memory response cache"
        );
        Self {
            cache: Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(Duration::from_secs(config.ttl_seconds))
                .build(),
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl ResponseCache for InMemoryCache {
    async fn lookup(&self, request: &ChatRequest) -> Result<Option<GatewayResponse>, CacheError> {
        let key = request_key(request);
        Ok(self.cache.get(&key).await.map(|r| (*r).clone()))
    }

    async fn store(
        &self,
        request: &ChatRequest,
        response: &GatewayResponse,
    ) -> Result<(), CacheError> {
        let key = request_key(request);
        self.cache.insert(key, Arc::new(response.clone())).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CostBreakdown, Message, TokenUsage};
    use crate::routing::{RoutingDecision, RoutingStrategy};

    fn response(content: &str) -> GatewayResponse {
        GatewayResponse {
            content: content.to_string(),
            usage: TokenUsage {
                input_tokens: 4,
                output_tokens: 8,
            },
            cost: CostBreakdown::default(),
            latency_ms: 120,
            cached: false,
            provider_used: "alpha".to_string(),
            model_used: "m1".to_string(),
            routing: RoutingDecision {
                strategy: RoutingStrategy::Balanced,
                provider: "alpha".to_string(),
                model: "m1".to_string(),
                complexity_score: 0.1,
                reason: "test".to_string(),
                alternatives: vec![],
            },
            warnings: vec![],
        }
    }

    fn cache() -> InMemoryCache {
        InMemoryCache::new(&CacheConfig {
            enabled: true,
            semantic_similarity_threshold: 0.95,
            max_entries: 100,
            ttl_seconds: 300,
        })
    }

    #[test]
    fn test_key_stability_and_sensitivity() {
        let a = ChatRequest::new(vec![Message::user("hello")]);
        let b = ChatRequest::new(vec![Message::user("hello")]);
        let c = ChatRequest::new(vec![Message::user("goodbye")]);
        let d = ChatRequest::new(vec![Message::assistant("hello")]);

        assert_eq!(request_key(&a), request_key(&b));
        assert_ne!(request_key(&a), request_key(&c));
        assert_ne!(request_key(&a), request_key(&d));
    }

    #[test]
    fn test_key_ignores_metadata() {
        let plain = ChatRequest::new(vec![Message::user("hello")]);
        let tagged = ChatRequest::new(vec![Message::user("hello")]).with_id("req-9");

        assert_eq!(request_key(&plain), request_key(&tagged));
    }

    #[tokio::test]
    async fn test_store_then_lookup() {
        let cache = cache();
        let request = ChatRequest::new(vec![Message::user("hello")]);

        assert!(cache.lookup(&request).await.unwrap().is_none());

        cache.store(&request, &response("hi there")).await.unwrap();
        let hit = cache.lookup(&request).await.unwrap().unwrap();
        assert_eq!(hit.content, "hi there");
    }

    #[tokio::test]
    async fn test_different_requests_do_not_collide() {
        let cache = cache();
        let first = ChatRequest::new(vec![Message::user("hello")]);
        let second = ChatRequest::new(vec![Message::user("other")]);

        cache.store(&first, &response("one")).await.unwrap();
        assert!(cache.lookup(&second).await.unwrap().is_none());
    }
}
