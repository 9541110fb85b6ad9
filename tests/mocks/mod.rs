//! Scriptable mock provider adapter for integration tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use llm_gateway::providers::{
    AdapterError, ChatRequest, Completion, FinishReason, ProviderAdapter, TokenUsage,
};

struct MockState {
    script: VecDeque<Result<Completion, AdapterError>>,
    fail_by_default: bool,
    latency: Duration,
    calls: u32,
    last_request_text: Option<String>,
}

/// Adapter returning scripted results, then a configurable default
#[derive(Clone)]
pub struct MockAdapter {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockState {
                script: VecDeque::new(),
                fail_by_default: false,
                latency: Duration::ZERO,
                calls: 0,
                last_request_text: None,
            })),
        }
    }

    /// Fail every unscripted call with a retryable transport error
    pub fn failing(self) -> Self {
        self.state.lock().fail_by_default = true;
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = latency;
        self
    }

    /// Queue one result ahead of the default behavior
    pub fn push_result(&self, result: Result<Completion, AdapterError>) {
        self.state.lock().script.push_back(result);
    }

    pub fn calls(&self) -> u32 {
        self.state.lock().calls
    }

    pub fn last_request_text(&self) -> Option<String> {
        self.state.lock().last_request_text.clone()
    }

    pub fn ok_completion(content: &str) -> Completion {
        Completion {
            content: content.to_string(),
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 20,
            },
            finish_reason: FinishReason::Stop,
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: &ChatRequest,
        _model: &str,
    ) -> Result<Completion, AdapterError> {
        let latency = {
            let mut state = self.state.lock();
            state.calls += 1;
            state.last_request_text = Some(request.full_text());
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        if let Some(result) = state.script.pop_front() {
            return result;
        }
        if state.fail_by_default {
            return Err(AdapterError::Transport {
                message: format!("{} unavailable", self.name),
                retryable: true,
            });
        }
        Ok(Self::ok_completion(&format!("response from {}", self.name)))
    }
}
