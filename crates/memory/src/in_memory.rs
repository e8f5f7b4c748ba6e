//! In-memory stores, useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use memloop_core::conversation::{default_title, ConversationStore};
use memloop_core::error::StorageError;
use memloop_core::memory::MemoryStore;
use memloop_core::{
    ConversationId, ConversationRecord, MemorySnippet, NewSnippet, Turn, TurnContent, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct State {
    /// Insertion order doubles as the final tie-break when listing
    conversations: Vec<ConversationRecord>,
    turns: HashMap<ConversationId, Vec<Turn>>,
    snippets: Vec<MemorySnippet>,
    next_ordinal: u64,
}

impl State {
    fn owned(&self, user: &UserId, id: &ConversationId) -> Result<usize, StorageError> {
        self.conversations
            .iter()
            .position(|c| &c.id == id && &c.user_id == user)
            .ok_or_else(|| StorageError::ConversationNotFound {
                user_id: user.to_string(),
                conversation_id: id.to_string(),
            })
    }
}

/// Conversation and memory store kept in process memory.
///
/// Every write takes the state's write lock, which serializes writers for
/// all users at once.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_conversation(
        &self,
        user: &UserId,
        title: Option<&str>,
    ) -> Result<ConversationRecord, StorageError> {
        let now = Utc::now();
        let record = ConversationRecord {
            id: ConversationId::new(),
            user_id: user.clone(),
            title: title.map(str::to_string).unwrap_or_else(|| default_title(now)),
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.write().await;
        state.turns.insert(record.id.clone(), Vec::new());
        state.conversations.push(record.clone());
        debug!(conversation_id = %record.id, user = %user, "Conversation created");
        Ok(record)
    }

    async fn get_conversation(
        &self,
        user: &UserId,
        id: &ConversationId,
    ) -> Result<Option<ConversationRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .conversations
            .iter()
            .find(|c| &c.id == id && &c.user_id == user)
            .cloned())
    }

    async fn list_conversations(&self, user: &UserId) -> Result<Vec<ConversationRecord>, StorageError> {
        let state = self.state.read().await;
        let mut owned: Vec<(usize, ConversationRecord)> = state
            .conversations
            .iter()
            .enumerate()
            .filter(|(_, c)| &c.user_id == user)
            .map(|(i, c)| (i, c.clone()))
            .collect();
        owned.sort_by(|(ia, a), (ib, b)| {
            b.updated_at
                .cmp(&a.updated_at)
                .then(b.created_at.cmp(&a.created_at))
                .then(ib.cmp(ia))
        });
        Ok(owned.into_iter().map(|(_, c)| c).collect())
    }

    async fn append_turn(
        &self,
        user: &UserId,
        id: &ConversationId,
        content: TurnContent,
    ) -> Result<Turn, StorageError> {
        content.validate()?;
        let mut state = self.state.write().await;
        let idx = state.owned(user, id)?;
        let now = Utc::now();
        let log = state.turns.entry(id.clone()).or_default();
        let turn = Turn {
            conversation_id: id.clone(),
            sequence: log.last().map_or(1, |t| t.sequence + 1),
            content,
            timestamp: now,
        };
        log.push(turn.clone());
        state.conversations[idx].updated_at = now;
        Ok(turn)
    }

    async fn turns(&self, user: &UserId, id: &ConversationId) -> Result<Vec<Turn>, StorageError> {
        let state = self.state.read().await;
        state.owned(user, id)?;
        Ok(state.turns.get(id).cloned().unwrap_or_default())
    }

    async fn recent_turns(
        &self,
        user: &UserId,
        id: &ConversationId,
        limit: usize,
        before: Option<u64>,
    ) -> Result<Vec<Turn>, StorageError> {
        let state = self.state.read().await;
        state.owned(user, id)?;
        let log = state.turns.get(id).map(Vec::as_slice).unwrap_or_default();
        let eligible: Vec<&Turn> = log
            .iter()
            .filter(|t| before.is_none_or(|b| t.sequence < b))
            .collect();
        let skip = eligible.len().saturating_sub(limit);
        Ok(eligible.into_iter().skip(skip).cloned().collect())
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, snippet: NewSnippet) -> Result<MemorySnippet, StorageError> {
        let snippet = snippet.normalized()?;
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .snippets
            .iter()
            .find(|s| s.user_id == snippet.user_id && s.text == snippet.text)
        {
            debug!(ordinal = existing.ordinal, "Snippet already stored");
            return Ok(existing.clone());
        }

        state.next_ordinal += 1;
        let stored = MemorySnippet {
            ordinal: state.next_ordinal,
            user_id: snippet.user_id,
            text: snippet.text,
            source_conversation_id: snippet.source_conversation_id,
            created_at: Utc::now(),
            importance: snippet.importance,
        };
        state.snippets.push(stored.clone());
        Ok(stored)
    }

    async fn recent(&self, user: &UserId, lookback: usize) -> Result<Vec<MemorySnippet>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .snippets
            .iter()
            .rev()
            .filter(|s| &s.user_id == user)
            .take(lookback)
            .cloned()
            .collect())
    }

    async fn count(&self, user: &UserId) -> Result<usize, StorageError> {
        let state = self.state.read().await;
        Ok(state.snippets.iter().filter(|s| &s.user_id == user).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memloop_core::{ToolCall, ToolResult, TurnRole};

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    #[tokio::test]
    async fn sequences_start_at_one_and_are_gapless() {
        let store = InMemoryStore::new();
        let alice = user("alice");
        let conv = store.create_conversation(&alice, None).await.unwrap();

        for i in 0..5 {
            store
                .append_turn(&alice, &conv.id, TurnContent::user(format!("message {i}")))
                .await
                .unwrap();
        }

        let seqs: Vec<u64> = store
            .turns(&alice, &conv.id)
            .await
            .unwrap()
            .iter()
            .map(|t| t.sequence)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn concurrent_appends_keep_sequences_unique() {
        let store = InMemoryStore::new();
        let alice = user("alice");
        let conv = store.create_conversation(&alice, None).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let alice = alice.clone();
            let id = conv.id.clone();
            handles.push(tokio::spawn(async move {
                store.append_turn(&alice, &id, TurnContent::user(format!("m{i}"))).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let seqs: Vec<u64> = store
            .turns(&alice, &conv.id)
            .await
            .unwrap()
            .iter()
            .map(|t| t.sequence)
            .collect();
        assert_eq!(seqs, (1..=20).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn other_users_cannot_read_or_write_a_conversation() {
        let store = InMemoryStore::new();
        let alice = user("alice");
        let mallory = user("mallory");
        let conv = store.create_conversation(&alice, Some("private")).await.unwrap();

        assert!(store.get_conversation(&mallory, &conv.id).await.unwrap().is_none());
        assert!(matches!(
            store.turns(&mallory, &conv.id).await,
            Err(StorageError::ConversationNotFound { .. })
        ));
        assert!(matches!(
            store.append_turn(&mallory, &conv.id, TurnContent::user("hi")).await,
            Err(StorageError::ConversationNotFound { .. })
        ));
        assert!(store.list_conversations(&mallory).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_turns_window_is_oldest_first() {
        let store = InMemoryStore::new();
        let alice = user("alice");
        let conv = store.create_conversation(&alice, None).await.unwrap();
        for i in 1..=6 {
            store
                .append_turn(&alice, &conv.id, TurnContent::user(format!("t{i}")))
                .await
                .unwrap();
        }

        let window = store.recent_turns(&alice, &conv.id, 3, None).await.unwrap();
        let texts: Vec<&str> = window.iter().map(|t| t.content.text()).collect();
        assert_eq!(texts, vec!["t4", "t5", "t6"]);

        let before = store.recent_turns(&alice, &conv.id, 3, Some(6)).await.unwrap();
        let texts: Vec<&str> = before.iter().map(|t| t.content.text()).collect();
        assert_eq!(texts, vec!["t3", "t4", "t5"]);
    }

    #[tokio::test]
    async fn tool_turns_keep_call_and_result() {
        let store = InMemoryStore::new();
        let alice = user("alice");
        let conv = store.create_conversation(&alice, None).await.unwrap();
        let call = ToolCall {
            id: "call_1".into(),
            name: "calculator".into(),
            arguments: serde_json::json!({"expression": "2+2"}),
        };
        let turn = store
            .append_turn(&alice, &conv.id, TurnContent::tool(call, ToolResult::ok("call_1", "4")))
            .await
            .unwrap();
        assert_eq!(turn.role(), TurnRole::Tool);
        assert_eq!(turn.content.text(), "4");
    }

    #[tokio::test]
    async fn appending_bumps_updated_at_and_list_order() {
        let store = InMemoryStore::new();
        let alice = user("alice");
        let first = store.create_conversation(&alice, Some("first")).await.unwrap();
        let second = store.create_conversation(&alice, Some("second")).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .append_turn(&alice, &first.id, TurnContent::user("back to the first one"))
            .await
            .unwrap();

        let listed = store.list_conversations(&alice).await.unwrap();
        let titles: Vec<&str> = listed.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second"]);
        assert!(listed[0].updated_at > first.updated_at);
        assert_eq!(listed[1].id, second.id);
    }

    #[tokio::test]
    async fn snippets_are_deduplicated_per_user() {
        let store = InMemoryStore::new();
        let a1 = store
            .append(NewSnippet::new(user("a"), "Prefers short answers"))
            .await
            .unwrap();
        let a2 = store
            .append(NewSnippet::new(user("a"), "  Prefers short answers "))
            .await
            .unwrap();
        let b1 = store
            .append(NewSnippet::new(user("b"), "Prefers short answers"))
            .await
            .unwrap();

        assert_eq!(a1.ordinal, a2.ordinal);
        assert_ne!(a1.ordinal, b1.ordinal);
        assert_eq!(store.count(&user("a")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recent_snippets_are_newest_first_and_bounded() {
        let store = InMemoryStore::new();
        for i in 1..=5 {
            store
                .append(NewSnippet::new(user("a"), format!("fact {i}")))
                .await
                .unwrap();
        }
        store.append(NewSnippet::new(user("b"), "other")).await.unwrap();

        let recent = store.recent(&user("a"), 3).await.unwrap();
        let texts: Vec<&str> = recent.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["fact 5", "fact 4", "fact 3"]);
    }
}
