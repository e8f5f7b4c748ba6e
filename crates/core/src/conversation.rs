//! Users, conversations, and the append-only turn log.
//!
//! Every store access is keyed by a [`UserId`]. A `UserId` can only be built
//! from a non-blank string, so a request without an owner cannot reach a
//! store at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;
use crate::tool::{ToolCall, ToolResult};

/// Opaque identifier of the user owning conversations and memories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self, StorageError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(StorageError::MissingUser);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Header row of a conversation. The turns live in the store's log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub user_id: UserId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Bumped on every appended turn
    pub updated_at: DateTime<Utc>,
}

/// Title used when a conversation is opened without one.
pub fn default_title(now: DateTime<Utc>) -> String {
    format!("Conversation {}", now.format("%Y-%m-%d %H:%M"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::Tool => "tool",
        }
    }
}

impl std::str::FromStr for TurnRole {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            "tool" => Ok(TurnRole::Tool),
            other => Err(StorageError::InvalidRecord(format!("unknown turn role '{other}'"))),
        }
    }
}

/// What a turn says. The variant fixes the role, so a `tool` turn always
/// carries its call and the result paired with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum TurnContent {
    User { text: String },
    Assistant { text: String },
    Tool { call: ToolCall, result: ToolResult },
}

impl TurnContent {
    pub fn user(text: impl Into<String>) -> Self {
        TurnContent::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        TurnContent::Assistant { text: text.into() }
    }

    pub fn tool(call: ToolCall, result: ToolResult) -> Self {
        TurnContent::Tool { call, result }
    }

    pub fn role(&self) -> TurnRole {
        match self {
            TurnContent::User { .. } => TurnRole::User,
            TurnContent::Assistant { .. } => TurnRole::Assistant,
            TurnContent::Tool { .. } => TurnRole::Tool,
        }
    }

    /// Text of a user or assistant turn, or the output of a tool turn.
    pub fn text(&self) -> &str {
        match self {
            TurnContent::User { text } | TurnContent::Assistant { text } => text,
            TurnContent::Tool { result, .. } => &result.output,
        }
    }

    /// Reject tool turns whose result does not answer their call.
    pub fn validate(&self) -> Result<(), StorageError> {
        if let TurnContent::Tool { call, result } = self {
            if call.id != result.call_id {
                return Err(StorageError::InvalidRecord(format!(
                    "tool result '{}' does not match call '{}'",
                    result.call_id, call.id
                )));
            }
        }
        Ok(())
    }
}

/// One immutable entry of a conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub conversation_id: ConversationId,
    /// 1-based, gapless within a conversation
    pub sequence: u64,
    pub content: TurnContent,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn role(&self) -> TurnRole {
        self.content.role()
    }
}

/// Durable, append-only conversation log.
///
/// The store is the only writer of turns. Implementations serialize writers
/// per user so sequence numbers stay gapless, and treat a conversation owned
/// by another user exactly like a missing one.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Backend name (e.g. "sqlite", "in_memory").
    fn name(&self) -> &str;

    async fn create_conversation(
        &self,
        user: &UserId,
        title: Option<&str>,
    ) -> Result<ConversationRecord, StorageError>;

    async fn get_conversation(
        &self,
        user: &UserId,
        id: &ConversationId,
    ) -> Result<Option<ConversationRecord>, StorageError>;

    /// Most recently updated first.
    async fn list_conversations(&self, user: &UserId) -> Result<Vec<ConversationRecord>, StorageError>;

    /// Append a turn, assigning the next sequence number.
    async fn append_turn(
        &self,
        user: &UserId,
        id: &ConversationId,
        content: TurnContent,
    ) -> Result<Turn, StorageError>;

    /// Full log, oldest first.
    async fn turns(&self, user: &UserId, id: &ConversationId) -> Result<Vec<Turn>, StorageError>;

    /// The last `limit` turns (oldest first), optionally only those with a
    /// sequence number below `before`.
    async fn recent_turns(
        &self,
        user: &UserId,
        id: &ConversationId,
        limit: usize,
        before: Option<u64>,
    ) -> Result<Vec<Turn>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_user_ids_are_rejected() {
        assert!(matches!(UserId::new(""), Err(StorageError::MissingUser)));
        assert!(matches!(UserId::new("   "), Err(StorageError::MissingUser)));
        assert_eq!(UserId::new(" alice ").unwrap().as_str(), "alice");
    }

    #[test]
    fn user_id_deserialization_validates() {
        let ok: Result<UserId, _> = serde_json::from_str("\"bob\"");
        assert!(ok.is_ok());
        let blank: Result<UserId, _> = serde_json::from_str("\"\"");
        assert!(blank.is_err());
    }

    #[test]
    fn turn_content_role_tag_matches_variant() {
        let content = TurnContent::user("What's 2+2?");
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(content.role(), TurnRole::User);
        assert_eq!(content.text(), "What's 2+2?");
    }

    #[test]
    fn tool_turn_must_pair_call_and_result() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "calculator".into(),
            arguments: serde_json::json!({"expression": "2+2"}),
        };
        let paired = TurnContent::tool(call.clone(), ToolResult::ok("call_1", "4"));
        assert!(paired.validate().is_ok());
        assert_eq!(paired.text(), "4");

        let mismatched = TurnContent::tool(call, ToolResult::ok("call_2", "4"));
        assert!(matches!(mismatched.validate(), Err(StorageError::InvalidRecord(_))));
    }

    #[test]
    fn roles_parse_from_storage_strings() {
        for role in [TurnRole::User, TurnRole::Assistant, TurnRole::Tool] {
            assert_eq!(role.as_str().parse::<TurnRole>().unwrap(), role);
        }
        assert!("system".parse::<TurnRole>().is_err());
    }

    #[test]
    fn default_title_uses_minutes_precision() {
        let now = DateTime::parse_from_rfc3339("2026-03-01T09:05:59Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(default_title(now), "Conversation 2026-03-01 09:05");
    }
}
