//! Response sources: one interface over blocking and streaming model calls.
//!
//! The agent loop only ever sees a [`ModelReply`], final text or a list of
//! tool calls. [`BlockingSource`] gets it from one `complete()` call;
//! [`StreamingSource`] assembles it from [`StreamEvent`]s, forwarding text
//! deltas and tool calls to the caller as soon as each is complete.

use crate::stream_event::AgentStreamEvent;
use async_trait::async_trait;
use memloop_core::error::ProviderError;
use memloop_core::message::MessageToolCall;
use memloop_core::provider::{Provider, ProviderRequest, StreamEvent, Usage};
use memloop_core::tool::ToolCall;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// One complete model response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: String,
    /// Requested tool calls, in the order the model issued them
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
}

/// Where model replies come from.
#[async_trait]
pub trait ResponseSource: Send + Sync {
    /// Whether requests should be sent with `stream = true`.
    fn streaming(&self) -> bool;

    /// Invoke the model once. When `sink` is given, text is reported on it
    /// as [`AgentStreamEvent::Chunk`]. Tool calls are only returned; the loop
    /// announces them once it decides to execute them.
    async fn respond(
        &self,
        request: ProviderRequest,
        sink: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<ModelReply, ProviderError>;
}

/// Parse the raw argument text of a tool call. Empty text means no
/// arguments; anything else must be a JSON object.
fn parse_arguments(call_id: &str, raw: &str) -> Result<serde_json::Value, ProviderError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) if value.is_object() => Ok(value),
        Ok(_) => Err(ProviderError::MalformedResponse(format!(
            "arguments of tool call {call_id} are not a JSON object"
        ))),
        Err(e) => Err(ProviderError::MalformedResponse(format!(
            "arguments of tool call {call_id} are not valid JSON: {e}"
        ))),
    }
}

fn to_tool_call(tc: MessageToolCall) -> Result<ToolCall, ProviderError> {
    let arguments = parse_arguments(&tc.id, &tc.arguments)?;
    Ok(ToolCall {
        id: tc.id,
        name: tc.name,
        arguments,
    })
}

async fn emit(sink: Option<&mpsc::Sender<AgentStreamEvent>>, event: AgentStreamEvent) {
    if let Some(tx) = sink {
        let _ = tx.send(event).await;
    }
}

// ── Blocking ──────────────────────────────────────────────────────────────

/// Replies from `Provider::complete`.
pub struct BlockingSource {
    provider: Arc<dyn Provider>,
}

impl BlockingSource {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ResponseSource for BlockingSource {
    fn streaming(&self) -> bool {
        false
    }

    async fn respond(
        &self,
        request: ProviderRequest,
        sink: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<ModelReply, ProviderError> {
        let response = self.provider.complete(request).await?;
        let message = response.message;
        let tool_calls = message
            .tool_calls
            .into_iter()
            .map(to_tool_call)
            .collect::<Result<Vec<_>, _>>()?;

        if !message.content.is_empty() {
            emit(sink, AgentStreamEvent::Chunk { content: message.content.clone() }).await;
        }

        Ok(ModelReply {
            text: message.content,
            tool_calls,
            usage: response.usage,
        })
    }
}

// ── Streaming ─────────────────────────────────────────────────────────────

/// Something the accumulator recognized as complete.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognized {
    Text(String),
    ToolCall(ToolCall),
}

#[derive(Debug)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
    complete: Option<ToolCall>,
}

/// Folds a [`StreamEvent`] sequence into a [`ModelReply`].
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    /// In start order, which is the order the model requested them
    calls: Vec<PendingCall>,
    usage: Option<Usage>,
    done: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&mut self, id: &str) -> Result<&mut PendingCall, ProviderError> {
        self.calls
            .iter_mut()
            .find(|c| c.id == id && c.complete.is_none())
            .ok_or_else(|| ProviderError::MalformedResponse(format!("stream event for unknown tool call {id}")))
    }

    /// Apply one event. Returns the text delta or tool call it completed.
    pub fn push(&mut self, event: StreamEvent) -> Result<Option<Recognized>, ProviderError> {
        if self.done {
            trace!(?event, "Ignoring stream event after Done");
            return Ok(None);
        }
        match event {
            StreamEvent::TextDelta { text } => {
                self.text.push_str(&text);
                Ok(Some(Recognized::Text(text)))
            }
            StreamEvent::ToolCallStart { id, name } => {
                if self.calls.iter().any(|c| c.id == id) {
                    return Err(ProviderError::MalformedResponse(format!(
                        "tool call {id} started twice"
                    )));
                }
                self.calls.push(PendingCall {
                    id,
                    name,
                    arguments: String::new(),
                    complete: None,
                });
                Ok(None)
            }
            StreamEvent::ToolCallArguments { id, fragment } => {
                self.pending(&id)?.arguments.push_str(&fragment);
                Ok(None)
            }
            StreamEvent::ToolCallEnd { id } => {
                let pending = self.pending(&id)?;
                let call = ToolCall {
                    id: pending.id.clone(),
                    name: pending.name.clone(),
                    arguments: parse_arguments(&pending.id, &pending.arguments)?,
                };
                pending.complete = Some(call.clone());
                Ok(Some(Recognized::ToolCall(call)))
            }
            StreamEvent::Usage { usage } => {
                self.usage = Some(usage);
                Ok(None)
            }
            StreamEvent::Done => {
                if let Some(open) = self.calls.iter().find(|c| c.complete.is_none()) {
                    return Err(ProviderError::MalformedResponse(format!(
                        "stream finished with tool call {} still open",
                        open.id
                    )));
                }
                self.done = true;
                Ok(None)
            }
        }
    }

    /// The reply, once `Done` has been seen.
    pub fn finish(self) -> Result<ModelReply, ProviderError> {
        if !self.done {
            return Err(ProviderError::StreamInterrupted(
                "stream closed before completion".into(),
            ));
        }
        Ok(ModelReply {
            text: self.text,
            tool_calls: self.calls.into_iter().filter_map(|c| c.complete).collect(),
            usage: self.usage,
        })
    }
}

/// Replies assembled from `Provider::stream`.
pub struct StreamingSource {
    provider: Arc<dyn Provider>,
}

impl StreamingSource {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ResponseSource for StreamingSource {
    fn streaming(&self) -> bool {
        true
    }

    async fn respond(
        &self,
        request: ProviderRequest,
        sink: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<ModelReply, ProviderError> {
        let mut rx = self.provider.stream(request).await?;
        let mut acc = StreamAccumulator::new();

        while let Some(item) = rx.recv().await {
            match acc.push(item?)? {
                Some(Recognized::Text(content)) => {
                    emit(sink, AgentStreamEvent::Chunk { content }).await;
                }
                Some(Recognized::ToolCall(call)) => {
                    debug!(tool = %call.name, call_id = %call.id, "Tool call recognized in stream");
                }
                None => {}
            }
        }
        acc.finish()
    }
}
