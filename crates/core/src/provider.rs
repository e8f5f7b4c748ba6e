//! Provider trait: the boundary to the language model.
//!
//! A provider takes the assembled messages plus the tool schemas and answers
//! either with one complete message or with a stream of [`StreamEvent`]s.
//! Retry policy, if any, belongs to the provider; the agent loop treats every
//! provider error as fatal for the current invocation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "claude-sonnet-4-20250514")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the model so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message, tool calls included
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One unit of an incremental model response.
///
/// A tool call arrives as `ToolCallStart`, any number of
/// `ToolCallArguments` fragments (concatenated they form a JSON object), and
/// `ToolCallEnd`. The stream finishes with `Done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta { text: String },
    ToolCallStart { id: String, name: String },
    ToolCallArguments { id: String, fragment: String },
    ToolCallEnd { id: String },
    Usage { usage: Usage },
    Done,
}

/// Receiving half of a provider stream.
pub type StreamReceiver = mpsc::Receiver<std::result::Result<StreamEvent, ProviderError>>;

/// The core Provider trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of response events.
    ///
    /// Default implementation calls `complete()` and replays the result as
    /// events.
    async fn stream(&self, request: ProviderRequest) -> std::result::Result<StreamReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let events = response_to_events(response);
        let (tx, rx) = mpsc::channel(events.len());
        for event in events {
            let _ = tx.send(Ok(event)).await;
        }
        Ok(rx)
    }
}

/// Flatten a complete response into the event sequence a stream would carry.
pub fn response_to_events(response: ProviderResponse) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    if !response.message.content.is_empty() {
        events.push(StreamEvent::TextDelta {
            text: response.message.content,
        });
    }
    for tc in response.message.tool_calls {
        events.push(StreamEvent::ToolCallStart {
            id: tc.id.clone(),
            name: tc.name,
        });
        events.push(StreamEvent::ToolCallArguments {
            id: tc.id.clone(),
            fragment: tc.arguments,
        });
        events.push(StreamEvent::ToolCallEnd { id: tc.id });
    }
    if let Some(usage) = response.usage {
        events.push(StreamEvent::Usage { usage });
    }
    events.push(StreamEvent::Done);
    events
}
