//! Agent-level streaming events.
//!
//! `AgentStreamEvent` wraps provider-level stream events into higher-level
//! events a front end can render as they arrive.

use memloop_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// Events emitted by the agent during streaming execution.
///
/// - `chunk`       partial text from the model
/// - `tool_call`   a complete tool call was recognized
/// - `tool_result` tool execution completed
/// - `done`        the loop produced a final answer
/// - `aborted`     loop protection or cancellation stopped the loop
/// - `error`       a model or storage failure ended the invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text token from the model.
    Chunk { content: String },

    /// The model requested a tool.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed.
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The loop finished with an answer.
    Done {
        conversation_id: String,
        answer: String,
        usage: Usage,
        iterations: u32,
        tool_calls_made: usize,
    },

    /// The loop stopped without an answer.
    Aborted {
        conversation_id: String,
        reason: String,
        notice: String,
    },

    /// An error occurred mid-stream.
    Error { message: String },
}

impl AgentStreamEvent {
    /// Event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Aborted { .. } => "aborted",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this is the last event of a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Aborted { .. } | Self::Error { .. })
    }
}
