// Unified types for the gateway request path.
// Provider-agnostic request/response shapes shared by routing, security,
// dispatch, and caching.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unified chat-completion request accepted by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Caller-supplied identifier; generated when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Ordered conversation messages
    pub messages: Vec<Message>,

    /// Tool definitions attached to the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    /// Routing preferences (strategy, provider hints, budgets)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferences: Option<RoutingPreferences>,

    /// Metadata for tenancy, tracing and cost attribution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RequestMetadata>,

    /// Per-request deadline override in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

/// Message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Content of a message (plain text or ordered content blocks)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Part of a multimodal message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { media_type: String, data: String },
}

/// Tool definition forwarded to the provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

/// Caller hints that shape the routing decision
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingPreferences {
    /// Strategy override; the configured default applies when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<crate::routing::RoutingStrategy>,

    /// Providers to favor; when any survive filtering, only they are ranked
    pub preferred_providers: Vec<String>,

    /// Providers that must not be attempted
    pub exclude_providers: Vec<String>,

    /// Capabilities every candidate model must declare
    pub required_capabilities: Vec<crate::registry::Capability>,

    /// Upper bound on the model's p95 latency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,

    /// Advisory cost ceiling in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
}

/// Request metadata for tenancy and cost attribution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestMetadata {
    /// Tenant or project key; also the rate-limit key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Custom tags
    pub tags: HashMap<String, String>,
}

/// Token usage reported by a provider
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Dollar cost of a completed request
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

/// Raw completion returned by a provider adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
}

/// Reason why generation finished
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolUse,
}

/// Incremental delta emitted by a streaming adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Final response surfaced to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub cost: CostBreakdown,
    pub latency_ms: u64,
    pub cached: bool,
    pub provider_used: String,
    pub model_used: String,
    pub routing: crate::routing::RoutingDecision,
    pub warnings: Vec<String>,
}

impl ChatRequest {
    /// Create a request from a message list
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            id: None,
            messages,
            tools: None,
            preferences: None,
            metadata: None,
            deadline_ms: None,
        }
    }

    /// Add a user message
    pub fn with_user_message(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    /// Set the caller-supplied request id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set routing preferences
    pub fn with_preferences(mut self, preferences: RoutingPreferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Set request metadata
    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach tool definitions
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Set a per-request deadline
    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }

    /// Whether any tools are attached
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Concatenated text of every message, in order
    pub fn full_text(&self) -> String {
        let mut out = String::new();
        for message in &self.messages {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&message.text());
        }
        out
    }

    /// Concatenated text of all system messages
    pub fn system_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(Message::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Text of the last user message, when present
    pub fn last_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(Message::text)
    }
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Concatenated text of the message, skipping non-text blocks
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}
