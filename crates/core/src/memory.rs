//! Cross-conversation memory.
//!
//! Snippets are short facts about a user, attributed to the conversation
//! they came from. They are append-only: a newer fact supersedes an older one
//! by being written next to it, never by editing it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationId, UserId};
use crate::error::StorageError;

/// A stored memory snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnippet {
    /// Store-assigned insertion order, increasing across the whole store
    pub ordinal: u64,

    pub user_id: UserId,

    pub text: String,

    /// Conversation the snippet was drawn from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_conversation_id: Option<ConversationId>,

    pub created_at: DateTime<Utc>,

    /// Optional weight in `[0, 1]` supplied by whoever wrote the snippet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f32>,
}

impl MemorySnippet {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A snippet about to be written.
#[derive(Debug, Clone)]
pub struct NewSnippet {
    pub user_id: UserId,
    pub text: String,
    pub source_conversation_id: Option<ConversationId>,
    pub importance: Option<f32>,
}

impl NewSnippet {
    pub fn new(user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            user_id,
            text: text.into(),
            source_conversation_id: None,
            importance: None,
        }
    }

    pub fn from_conversation(mut self, id: ConversationId) -> Self {
        self.source_conversation_id = Some(id);
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }

    /// Trim the text and clamp the importance, rejecting empty snippets.
    pub fn normalized(mut self) -> Result<Self, StorageError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(StorageError::InvalidRecord("memory snippet text is empty".into()));
        }
        self.text = text.to_string();
        self.importance = match self.importance {
            Some(v) if v.is_finite() => Some(v.clamp(0.0, 1.0)),
            Some(_) => {
                return Err(StorageError::InvalidRecord("importance must be a finite number".into()));
            }
            None => None,
        };
        Ok(self)
    }
}

/// Durable, append-only snippet store.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Backend name (e.g. "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Append a snippet. Writing text identical to an existing snippet of
    /// the same user returns the existing one.
    async fn append(&self, snippet: NewSnippet) -> Result<MemorySnippet, StorageError>;

    /// Up to `lookback` snippets of `user`, newest first.
    async fn recent(&self, user: &UserId, lookback: usize) -> Result<Vec<MemorySnippet>, StorageError>;

    async fn count(&self, user: &UserId) -> Result<usize, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserId {
        UserId::new("alice").unwrap()
    }

    #[test]
    fn normalization_trims_and_clamps() {
        let snippet = NewSnippet::new(alice(), "  Lives in Madrid \n")
            .with_importance(3.0)
            .normalized()
            .unwrap();
        assert_eq!(snippet.text, "Lives in Madrid");
        assert_eq!(snippet.importance, Some(1.0));
    }

    #[test]
    fn empty_snippets_are_rejected() {
        let err = NewSnippet::new(alice(), "   ").normalized().unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(_)));
    }

    #[test]
    fn nan_importance_is_rejected() {
        let err = NewSnippet::new(alice(), "fact")
            .with_importance(f32::NAN)
            .normalized()
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(_)));
    }
}
