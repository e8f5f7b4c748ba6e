//! The agent reasoning loop implementation.
//!
//! One invocation drives a single user message through
//! `Start → AwaitingModelResponse → (ExecutingTools → AwaitingModelResponse)* → Done | Aborted`.
//! Every turn it produces is written through the [`ConversationStore`]; the
//! only state kept between iterations is the working message list of the
//! current invocation.

use crate::context::ContextAssembler;
use crate::extract::SnippetExtractor;
use crate::source::{BlockingSource, ModelReply, ResponseSource, StreamingSource};
use crate::stream_event::AgentStreamEvent;
use chrono::Utc;
use futures::future::join_all;
use memloop_config::AppConfig;
use memloop_core::conversation::{ConversationId, ConversationStore, TurnContent, UserId};
use memloop_core::error::StorageError;
use memloop_core::event::{DomainEvent, EventBus};
use memloop_core::memory::{MemoryStore, NewSnippet};
use memloop_core::message::{Message, MessageToolCall};
use memloop_core::provider::{Provider, ProviderRequest, Usage};
use memloop_core::tool::{ToolCall, ToolContext, ToolRegistry, ToolResult};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the channel returned by [`AgentLoop::run_stream`].
pub const STREAM_CHANNEL_CAPACITY: usize = 128;

/// Shown to the user when a request is cancelled mid-flight.
pub const CANCELLED_NOTICE: &str = "The request was cancelled before it completed.";

/// Model settings and loop protection.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Upper bound on model invocations per call to `run`
    pub max_iterations: u32,
    /// Dispatch the tool calls of one reply concurrently
    pub parallel_tools: bool,
}

impl LoopConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.agent.model.clone(),
            temperature: config.agent.temperature,
            max_tokens: Some(config.agent.max_tokens),
            max_iterations: config.agent.max_iterations,
            parallel_tools: config.agent.parallel_tools,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Start,
    AwaitingModelResponse,
    ExecutingTools,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    MaxIterationsExceeded,
    Cancelled,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::MaxIterationsExceeded => "max_iterations",
            AbortReason::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    /// The model answered; the answer is persisted as an assistant turn.
    Done { answer: String },
    /// The loop stopped early. The notice is for the user and is not persisted.
    Aborted { reason: AbortReason, notice: String },
}

/// Result of one call to [`AgentLoop::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub conversation_id: ConversationId,
    pub terminal: Terminal,
    /// Model invocations made
    pub iterations: u32,
    pub tool_calls_made: usize,
    pub usage: Usage,
}

impl LoopOutcome {
    /// The answer, or the abort notice.
    pub fn text(&self) -> &str {
        match &self.terminal {
            Terminal::Done { answer } => answer,
            Terminal::Aborted { notice, .. } => notice,
        }
    }

    fn outcome_label(&self) -> &'static str {
        match &self.terminal {
            Terminal::Done { .. } => "done",
            Terminal::Aborted { reason, .. } => reason.as_str(),
        }
    }
}

pub fn max_iterations_notice(max_iterations: u32) -> String {
    format!(
        "I've reached the maximum number of tool call iterations ({max_iterations}). \
         Please provide further guidance."
    )
}

#[derive(Clone)]
struct AutoSave {
    store: Arc<dyn MemoryStore>,
    extractor: Arc<dyn SnippetExtractor>,
}

/// The core agent loop that orchestrates model calls and tool execution.
///
/// Cloning is cheap; every collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    conversations: Arc<dyn ConversationStore>,
    assembler: Arc<ContextAssembler>,
    config: LoopConfig,
    auto_save: Option<AutoSave>,
    event_bus: Option<Arc<EventBus>>,
}

/// Per-invocation bookkeeping.
struct Progress {
    conversation_id: ConversationId,
    iterations: u32,
    tool_calls_made: usize,
    usage: Usage,
    state: LoopState,
}

impl Progress {
    fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            iterations: 0,
            tool_calls_made: 0,
            usage: Usage::default(),
            state: LoopState::Start,
        }
    }

    fn transition(&mut self, next: LoopState) {
        debug!(
            conversation_id = %self.conversation_id,
            iteration = self.iterations,
            from = ?self.state,
            to = ?next,
            "Loop state transition"
        );
        self.state = next;
    }

    fn finish(mut self, terminal: Terminal) -> LoopOutcome {
        let next = match &terminal {
            Terminal::Done { .. } => LoopState::Done,
            Terminal::Aborted { .. } => LoopState::Aborted,
        };
        self.transition(next);
        LoopOutcome {
            conversation_id: self.conversation_id,
            terminal,
            iterations: self.iterations,
            tool_calls_made: self.tool_calls_made,
            usage: self.usage,
        }
    }

    fn cancelled(self) -> LoopOutcome {
        info!(conversation_id = %self.conversation_id, iteration = self.iterations, "Loop cancelled");
        self.finish(Terminal::Aborted {
            reason: AbortReason::Cancelled,
            notice: CANCELLED_NOTICE.into(),
        })
    }
}

async fn notify(sink: Option<&mpsc::Sender<AgentStreamEvent>>, event: AgentStreamEvent) {
    if let Some(tx) = sink {
        let _ = tx.send(event).await;
    }
}

fn tool_call_event(call: &ToolCall) -> AgentStreamEvent {
    AgentStreamEvent::ToolCall {
        id: call.id.clone(),
        name: call.name.clone(),
        input: call.arguments.clone(),
    }
}

fn tool_result_event(call: &ToolCall, result: &ToolResult) -> AgentStreamEvent {
    AgentStreamEvent::ToolResult {
        id: call.id.clone(),
        name: call.name.clone(),
        output: result.output.clone(),
        success: result.success,
    }
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        conversations: Arc<dyn ConversationStore>,
        assembler: Arc<ContextAssembler>,
        config: LoopConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            conversations,
            assembler,
            config,
            auto_save: None,
            event_bus: None,
        }
    }

    /// Save snippets extracted from every finished exchange.
    pub fn with_auto_save(mut self, store: Arc<dyn MemoryStore>, extractor: Arc<dyn SnippetExtractor>) -> Self {
        self.auto_save = Some(AutoSave { store, extractor });
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Process one user message and return once the loop is terminal.
    ///
    /// Without a `conversation` a new one is created. If `cancel` has already
    /// fired nothing is read or written, and the id of a conversation that
    /// would have been created is never persisted. Tool failures are fed
    /// back to the model; provider and storage failures end the invocation
    /// with an error. Hitting the iteration cap or `cancel` firing is an
    /// [`Terminal::Aborted`] outcome, not an error.
    pub async fn run(
        &self,
        user: &UserId,
        conversation: Option<ConversationId>,
        input: &str,
        cancel: &CancellationToken,
    ) -> memloop_core::Result<LoopOutcome> {
        let source = BlockingSource::new(self.provider.clone());
        self.run_with(&source, None, user, conversation, input, cancel).await
    }

    /// Streaming variant of [`run`](Self::run).
    ///
    /// Text deltas are sent as they arrive. Each tool call is announced when
    /// it is dispatched and followed by its result, so calls the loop never
    /// runs (for example past the iteration cap) are not announced. The
    /// channel always ends with exactly one `done`, `aborted` or `error` event.
    pub fn run_stream(
        &self,
        user: UserId,
        conversation: Option<ConversationId>,
        input: String,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<AgentStreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let agent = self.clone();

        tokio::spawn(async move {
            let source = StreamingSource::new(agent.provider.clone());
            let result = agent
                .run_with(&source, Some(&tx), &user, conversation, &input, &cancel)
                .await;

            let last = match result {
                Ok(outcome) => {
                    let conversation_id = outcome.conversation_id.to_string();
                    match outcome.terminal {
                        Terminal::Done { answer } => AgentStreamEvent::Done {
                            conversation_id,
                            answer,
                            usage: outcome.usage,
                            iterations: outcome.iterations,
                            tool_calls_made: outcome.tool_calls_made,
                        },
                        Terminal::Aborted { reason, notice } => AgentStreamEvent::Aborted {
                            conversation_id,
                            reason: reason.as_str().to_string(),
                            notice,
                        },
                    }
                }
                Err(e) => AgentStreamEvent::Error { message: e.to_string() },
            };
            let _ = tx.send(last).await;
        });

        rx
    }

    async fn run_with(
        &self,
        source: &dyn ResponseSource,
        sink: Option<&mpsc::Sender<AgentStreamEvent>>,
        user: &UserId,
        conversation: Option<ConversationId>,
        input: &str,
        cancel: &CancellationToken,
    ) -> memloop_core::Result<LoopOutcome> {
        let context_label = match &conversation {
            Some(id) => format!("conversation {id}"),
            None => "new conversation".to_string(),
        };
        match self.drive(source, sink, user, conversation, input, cancel).await {
            Ok(outcome) => {
                self.publish(DomainEvent::LoopFinished {
                    conversation_id: outcome.conversation_id.to_string(),
                    outcome: outcome.outcome_label().to_string(),
                    iterations: outcome.iterations,
                    timestamp: Utc::now(),
                });
                Ok(outcome)
            }
            Err(e) => {
                warn!(user = %user, error = %e, "Agent loop failed");
                self.publish(DomainEvent::ErrorOccurred {
                    context: context_label,
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn resolve_conversation(
        &self,
        user: &UserId,
        conversation: Option<ConversationId>,
    ) -> Result<ConversationId, StorageError> {
        match conversation {
            Some(id) => match self.conversations.get_conversation(user, &id).await? {
                Some(record) => Ok(record.id),
                None => Err(StorageError::ConversationNotFound {
                    user_id: user.to_string(),
                    conversation_id: id.to_string(),
                }),
            },
            None => Ok(self.conversations.create_conversation(user, None).await?.id),
        }
    }

    async fn append(
        &self,
        user: &UserId,
        conversation: &ConversationId,
        content: TurnContent,
    ) -> Result<u64, StorageError> {
        let turn = self.conversations.append_turn(user, conversation, content).await?;
        self.publish(DomainEvent::TurnAppended {
            conversation_id: conversation.to_string(),
            sequence: turn.sequence,
            role: turn.role(),
            timestamp: turn.timestamp,
        });
        Ok(turn.sequence)
    }

    async fn drive(
        &self,
        source: &dyn ResponseSource,
        sink: Option<&mpsc::Sender<AgentStreamEvent>>,
        user: &UserId,
        conversation: Option<ConversationId>,
        input: &str,
        cancel: &CancellationToken,
    ) -> memloop_core::Result<LoopOutcome> {
        if cancel.is_cancelled() {
            return Ok(Progress::new(conversation.unwrap_or_default()).cancelled());
        }

        let conversation_id = self.resolve_conversation(user, conversation).await?;
        let mut progress = Progress::new(conversation_id.clone());
        info!(
            conversation_id = %conversation_id,
            user = %user,
            streaming = source.streaming(),
            "Processing user message"
        );

        // ── Start ──────────────────────────────────────────────────────────
        let user_sequence = self.append(user, &conversation_id, TurnContent::user(input)).await?;
        let assembled = self
            .assembler
            .assemble_before(user, &conversation_id, input, Some(user_sequence))
            .await?;
        let mut working = assembled.messages;
        let tool_definitions = self.tools.list_schemas();
        let ctx = ToolContext::new(user.clone()).in_conversation(conversation_id.clone());

        loop {
            // ── AwaitingModelResponse ──────────────────────────────────────
            progress.transition(LoopState::AwaitingModelResponse);
            progress.iterations += 1;

            let request = ProviderRequest {
                model: self.config.model.clone(),
                messages: working.clone(),
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
                tools: tool_definitions.clone(),
                stream: source.streaming(),
            };

            let reply: ModelReply = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(progress.cancelled()),
                reply = source.respond(request, sink) => reply?,
            };
            if let Some(usage) = &reply.usage {
                progress.usage.add(usage);
            }

            if reply.tool_calls.is_empty() {
                if cancel.is_cancelled() {
                    return Ok(progress.cancelled());
                }
                self.append(user, &conversation_id, TurnContent::assistant(reply.text.clone()))
                    .await?;
                self.save_exchange(user, &conversation_id, input, &reply.text).await;
                info!(
                    conversation_id = %conversation_id,
                    iterations = progress.iterations,
                    tool_calls = progress.tool_calls_made,
                    "Final answer produced"
                );
                return Ok(progress.finish(Terminal::Done { answer: reply.text }));
            }

            if progress.iterations >= self.config.max_iterations {
                warn!(
                    conversation_id = %conversation_id,
                    iterations = progress.iterations,
                    pending_calls = reply.tool_calls.len(),
                    "Max tool iterations reached, aborting"
                );
                return Ok(progress.finish(Terminal::Aborted {
                    reason: AbortReason::MaxIterationsExceeded,
                    notice: max_iterations_notice(self.config.max_iterations),
                }));
            }

            // ── ExecutingTools ─────────────────────────────────────────────
            progress.transition(LoopState::ExecutingTools);
            debug!(
                conversation_id = %conversation_id,
                tool_count = reply.tool_calls.len(),
                "Executing tool calls"
            );

            let embedded: Vec<MessageToolCall> = reply
                .tool_calls
                .iter()
                .map(|c| MessageToolCall {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    arguments: c.arguments.to_string(),
                })
                .collect();
            working.push(Message::assistant_with_tools(reply.text.clone(), embedded));

            let Some(results) = self.execute_tools(&ctx, &reply.tool_calls, sink, cancel).await else {
                return Ok(progress.cancelled());
            };

            for (call, result) in reply.tool_calls.into_iter().zip(results) {
                if cancel.is_cancelled() {
                    return Ok(progress.cancelled());
                }
                working.push(Message::tool_result(&call.id, &result.output, !result.success));
                self.append(user, &conversation_id, TurnContent::tool(call, result)).await?;
                progress.tool_calls_made += 1;
            }
        }
    }

    /// Dispatch every call and return the results in request order.
    /// `None` when cancelled before all calls were started.
    ///
    /// A `tool_call` event is sent only for a call that is about to run, and
    /// is always followed by its `tool_result`.
    async fn execute_tools(
        &self,
        ctx: &ToolContext,
        calls: &[ToolCall],
        sink: Option<&mpsc::Sender<AgentStreamEvent>>,
        cancel: &CancellationToken,
    ) -> Option<Vec<ToolResult>> {
        if self.config.parallel_tools {
            if cancel.is_cancelled() {
                return None;
            }
            for call in calls {
                notify(sink, tool_call_event(call)).await;
            }
            let results = join_all(calls.iter().map(|call| self.dispatch_one(ctx, call))).await;
            for (call, result) in calls.iter().zip(&results) {
                notify(sink, tool_result_event(call, result)).await;
            }
            return Some(results);
        }

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            if cancel.is_cancelled() {
                return None;
            }
            notify(sink, tool_call_event(call)).await;
            let result = self.dispatch_one(ctx, call).await;
            notify(sink, tool_result_event(call, &result)).await;
            results.push(result);
        }
        Some(results)
    }

    async fn dispatch_one(&self, ctx: &ToolContext, call: &ToolCall) -> ToolResult {
        let started = Instant::now();
        let result = self.tools.dispatch(ctx, call).await;
        self.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success: result.success,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });
        result
    }

    /// Run the extractor over a finished exchange. Failures are logged: the
    /// answer is already persisted at this point.
    async fn save_exchange(&self, user: &UserId, conversation: &ConversationId, input: &str, answer: &str) {
        let Some(auto_save) = &self.auto_save else {
            return;
        };
        let mut stored = 0;
        for text in auto_save.extractor.extract(input, answer) {
            let snippet = NewSnippet::new(user.clone(), text).from_conversation(conversation.clone());
            match auto_save.store.append(snippet).await {
                Ok(saved) => {
                    debug!(ordinal = saved.ordinal, "Auto-saved exchange to memory");
                    stored += 1;
                }
                Err(e) => warn!(conversation_id = %conversation, error = %e, "Failed to auto-save to memory"),
            }
        }
        if stored > 0 {
            self.publish(DomainEvent::MemoryStored {
                user_id: user.to_string(),
                count: stored,
                timestamp: Utc::now(),
            });
        }
    }
}
