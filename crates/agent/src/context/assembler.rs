//! Context assembly: the model-facing message sequence for one user message.
//!
//! Produces, in fixed order:
//!
//! 1. **System** instructions, never trimmed
//! 2. **Memory** block of retrieved snippets as numbered facts, never
//!    trimmed, omitted entirely when retrieval finds nothing
//! 3. **History**, the most recent turns of the conversation, oldest first;
//!    trimmed oldest-first to fit the overall budget
//! 4. **The new user message**, never trimmed
//!
//! # Determinism
//!
//! Assembly is read-only and deterministic: identical store contents and
//! inputs always produce identical messages.

use crate::context::token;
use memloop_config::{AppConfig, BudgetUnit};
use memloop_core::conversation::ConversationStore;
use memloop_core::error::StorageError;
use memloop_core::message::{Message, MessageToolCall};
use memloop_core::{ConversationId, MemorySnippet, Turn, TurnContent, UserId};
use memloop_memory::MemoryRetriever;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Heading of the memory block; providers see it as a system message.
pub const MEMORY_HEADER: &str = "[Memory]";

// ── Types ─────────────────────────────────────────────────────────────────

/// Assembler settings.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    pub system_prompt: String,
    /// Most recent turns read from the conversation
    pub history_window: usize,
    /// Overall size limit of the assembled messages
    pub budget: usize,
    pub unit: BudgetUnit,
    /// Character budget handed to the memory retriever
    pub memory_budget: usize,
}

impl AssemblerConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            system_prompt: config.agent.system_prompt.clone(),
            history_window: config.context.history_window,
            budget: config.context.budget,
            unit: config.context.unit,
            memory_budget: config.memory.budget_chars,
        }
    }
}

/// The assembled context, ready for a model call.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// System block, optional memory block, history, new user message
    pub messages: Vec<Message>,
    /// Snippets rendered into the memory block
    pub memory: Vec<MemorySnippet>,
    pub metadata: AssemblyMetadata,
}

/// What assembly kept and dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Size of the assembled messages, in `unit`
    pub used: usize,
    pub budget: usize,
    pub unit: BudgetUnit,
    pub history_turns_included: usize,
    pub history_turns_dropped: usize,
}

/// History turns rendered as messages that must be kept or dropped together.
///
/// A run of tool turns becomes one assistant message carrying the calls plus
/// one result message per call; dropping only part of it would leave tool
/// results without the request they answer.
#[derive(Debug)]
struct HistoryGroup {
    messages: Vec<Message>,
    turns: usize,
    starts_with_user: bool,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Builds model requests from the conversation log and memory.
pub struct ContextAssembler {
    conversations: Arc<dyn ConversationStore>,
    retriever: MemoryRetriever,
    config: AssemblerConfig,
}

impl ContextAssembler {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        retriever: MemoryRetriever,
        config: AssemblerConfig,
    ) -> Self {
        Self {
            conversations,
            retriever,
            config,
        }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Assemble the context for `new_message` using the whole conversation
    /// as history.
    pub async fn assemble(
        &self,
        user: &UserId,
        conversation: &ConversationId,
        new_message: &str,
    ) -> Result<AssembledContext, StorageError> {
        self.assemble_before(user, conversation, new_message, None).await
    }

    /// Like [`assemble`](Self::assemble), but history only includes turns
    /// with a sequence number below `before`. The agent loop passes the
    /// sequence of the user turn it just appended, so that turn is not
    /// repeated as history.
    pub async fn assemble_before(
        &self,
        user: &UserId,
        conversation: &ConversationId,
        new_message: &str,
        before: Option<u64>,
    ) -> Result<AssembledContext, StorageError> {
        let unit = self.config.unit;

        // ── Fixed blocks ───────────────────────────────────────────────────
        let system = Message::system(&self.config.system_prompt);
        let memory = self
            .retriever
            .retrieve(user, new_message, self.config.memory_budget)
            .await?;
        let memory_message = render_memory_block(&memory).map(Message::system);
        let user_message = Message::user(new_message);

        let mut used = token::measure(&system, unit) + token::measure(&user_message, unit);
        if let Some(m) = &memory_message {
            used += token::measure(m, unit);
        }
        if used > self.config.budget {
            warn!(
                conversation_id = %conversation,
                used,
                budget = self.config.budget,
                "System, memory and user message alone exceed the context budget"
            );
        }

        // ── History, newest groups first until the budget is spent ─────────
        let turns = self
            .conversations
            .recent_turns(user, conversation, self.config.history_window, before)
            .await?;
        let total_turns = turns.len();
        let groups = group_history(&turns);

        let mut remaining = self.config.budget.saturating_sub(used);
        let mut kept: Vec<HistoryGroup> = Vec::new();
        for group in groups.into_iter().rev() {
            let size = token::measure_all(&group.messages, unit);
            if size > remaining {
                break;
            }
            remaining -= size;
            kept.push(group);
        }
        kept.reverse();

        // History opens with a user message; a leading assistant or tool
        // group left over from trimming is dropped too.
        let lead = kept.iter().take_while(|g| !g.starts_with_user).count();
        kept.drain(..lead);

        let included_turns: usize = kept.iter().map(|g| g.turns).sum();
        let history: Vec<Message> = kept.into_iter().flat_map(|g| g.messages).collect();
        used += token::measure_all(&history, unit);

        // ── Final sequence ─────────────────────────────────────────────────
        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(system);
        messages.extend(memory_message);
        messages.extend(history);
        messages.push(user_message);

        let metadata = AssemblyMetadata {
            used,
            budget: self.config.budget,
            unit,
            history_turns_included: included_turns,
            history_turns_dropped: total_turns - included_turns,
        };
        debug!(
            conversation_id = %conversation,
            snippets = memory.len(),
            history_turns = metadata.history_turns_included,
            dropped_turns = metadata.history_turns_dropped,
            used = metadata.used,
            budget = metadata.budget,
            "Context assembled"
        );

        Ok(AssembledContext {
            messages,
            memory,
            metadata,
        })
    }
}

/// Render snippets as numbered facts. `None` when there are none, so no
/// empty block is ever emitted.
pub fn render_memory_block(snippets: &[MemorySnippet]) -> Option<String> {
    if snippets.is_empty() {
        return None;
    }
    let mut block = format!("{MEMORY_HEADER}\nFacts remembered from earlier conversations with this user:");
    for (i, s) in snippets.iter().enumerate() {
        block.push_str(&format!("\n{}. {}", i + 1, s.text));
    }
    Some(block)
}

/// Turn the persisted log into message groups, oldest first.
fn group_history(turns: &[Turn]) -> Vec<HistoryGroup> {
    let mut groups: Vec<HistoryGroup> = Vec::new();
    let mut i = 0;
    while i < turns.len() {
        match &turns[i].content {
            TurnContent::User { text } => {
                groups.push(HistoryGroup {
                    messages: vec![Message::user(text)],
                    turns: 1,
                    starts_with_user: true,
                });
                i += 1;
            }
            TurnContent::Assistant { text } => {
                groups.push(HistoryGroup {
                    messages: vec![Message::assistant(text)],
                    turns: 1,
                    starts_with_user: false,
                });
                i += 1;
            }
            TurnContent::Tool { .. } => {
                let run: Vec<&Turn> = turns[i..]
                    .iter()
                    .take_while(|t| matches!(t.content, TurnContent::Tool { .. }))
                    .collect();
                let mut calls = Vec::with_capacity(run.len());
                let mut results = Vec::with_capacity(run.len());
                for turn in &run {
                    if let TurnContent::Tool { call, result } = &turn.content {
                        calls.push(MessageToolCall {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        });
                        results.push(Message::tool_result(&call.id, &result.output, !result.success));
                    }
                }
                let mut messages = vec![Message::assistant_with_tools("", calls)];
                messages.extend(results);
                groups.push(HistoryGroup {
                    messages,
                    turns: run.len(),
                    starts_with_user: false,
                });
                i += run.len();
            }
        }
    }
    groups
}

// ── Tests ─────────────────────────────────────────────────────────────────
