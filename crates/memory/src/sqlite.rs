//! SQLite-backed conversation and memory stores.
//!
//! One database file holds three tables:
//! - `conversations`: one header row per conversation, owned by a user
//! - `turns`: the append-only log, unique on `(conversation_id, sequence)`
//! - `memory_snippets`: append-only snippets, unique on `(user_id, text)`
//!
//! Writers for the same user are serialized with [`UserLocks`] and each
//! append runs in a transaction, so a turn is either fully written with the
//! next sequence number or not written at all.

use crate::locks::UserLocks;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use memloop_core::conversation::{default_title, ConversationStore};
use memloop_core::error::StorageError;
use memloop_core::memory::MemoryStore;
use memloop_core::{
    ConversationId, ConversationRecord, MemorySnippet, NewSnippet, Turn, TurnContent, TurnRole, UserId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Durable stores in a single SQLite database.
pub struct SqliteStore {
    pool: SqlitePool,
    locks: UserLocks,
}

/// Map a sqlx error onto the storage taxonomy.
fn db_error(context: &str, e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageError::Unavailable(format!("{context}: {e}"))
        }
        _ => StorageError::QueryFailed(format!("{context}: {e}")),
    }
}

/// Current time at the precision stored on disk.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidRecord(format!("bad timestamp '{raw}': {e}")))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StorageError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StorageError::QueryFailed(format!("{name} column: {e}")))
}

/// Clamp a `usize` count into SQLite's integer range.
fn sql_limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl SqliteStore {
    /// Open (or create) a database file, creating missing parent directories.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| db_error("open SQLite", e))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite store initialized at {}", path.display());
        Ok(store)
    }

    /// An ephemeral database living in one pooled connection.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| db_error("in-memory options", e))?
            .pragma("foreign_keys", "ON");

        // Every connection would get its own empty database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| db_error("open in-memory SQLite", e))?;

        Self::from_pool(pool).await
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        let store = Self {
            pool,
            locks: UserLocks::new(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        let statements = [
            (
                "conversations table",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id          TEXT PRIMARY KEY NOT NULL,
                    user_id     TEXT NOT NULL,
                    title       TEXT NOT NULL,
                    created_at  TEXT NOT NULL,
                    updated_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "conversations index",
                "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, updated_at DESC)",
            ),
            (
                "turns table",
                r#"
                CREATE TABLE IF NOT EXISTS turns (
                    conversation_id TEXT NOT NULL REFERENCES conversations(id),
                    user_id         TEXT NOT NULL,
                    sequence        INTEGER NOT NULL,
                    role            TEXT NOT NULL,
                    content         TEXT NOT NULL,
                    created_at      TEXT NOT NULL,
                    UNIQUE(conversation_id, sequence)
                )
                "#,
            ),
            (
                "memory_snippets table",
                r#"
                CREATE TABLE IF NOT EXISTS memory_snippets (
                    ordinal                 INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id                 TEXT NOT NULL,
                    text                    TEXT NOT NULL,
                    source_conversation_id  TEXT,
                    created_at              TEXT NOT NULL,
                    importance              REAL,
                    UNIQUE(user_id, text)
                )
                "#,
            ),
            (
                "memory_snippets index",
                "CREATE INDEX IF NOT EXISTS idx_snippets_user ON memory_snippets(user_id, ordinal DESC)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_conversation(row: &SqliteRow) -> Result<ConversationRecord, StorageError> {
        let id: String = column(row, "id")?;
        let user_id: String = column(row, "user_id")?;
        let created_at: String = column(row, "created_at")?;
        let updated_at: String = column(row, "updated_at")?;
        Ok(ConversationRecord {
            id: ConversationId(id),
            user_id: UserId::new(user_id)?,
            title: column(row, "title")?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    fn row_to_turn(row: &SqliteRow) -> Result<Turn, StorageError> {
        let conversation_id: String = column(row, "conversation_id")?;
        let sequence: i64 = column(row, "sequence")?;
        let role: String = column(row, "role")?;
        let content_json: String = column(row, "content")?;
        let created_at: String = column(row, "created_at")?;

        let content: TurnContent = serde_json::from_str(&content_json)
            .map_err(|e| StorageError::InvalidRecord(format!("turn content: {e}")))?;
        if content.role() != role.parse::<TurnRole>()? {
            return Err(StorageError::InvalidRecord(format!(
                "turn {sequence} role column '{role}' disagrees with its content"
            )));
        }

        Ok(Turn {
            conversation_id: ConversationId(conversation_id),
            sequence: u64::try_from(sequence)
                .map_err(|_| StorageError::InvalidRecord(format!("negative sequence {sequence}")))?,
            content,
            timestamp: parse_timestamp(&created_at)?,
        })
    }

    fn row_to_snippet(row: &SqliteRow) -> Result<MemorySnippet, StorageError> {
        let ordinal: i64 = column(row, "ordinal")?;
        let user_id: String = column(row, "user_id")?;
        let source: Option<String> = column(row, "source_conversation_id")?;
        let created_at: String = column(row, "created_at")?;
        let importance: Option<f64> = column(row, "importance")?;
        Ok(MemorySnippet {
            ordinal: u64::try_from(ordinal)
                .map_err(|_| StorageError::InvalidRecord(format!("negative ordinal {ordinal}")))?,
            user_id: UserId::new(user_id)?,
            text: column(row, "text")?,
            source_conversation_id: source.map(ConversationId),
            created_at: parse_timestamp(&created_at)?,
            importance: importance.map(|v| v as f32),
        })
    }

    async fn ensure_owned(&self, user: &UserId, id: &ConversationId) -> Result<(), StorageError> {
        match self.get_conversation(user, id).await? {
            Some(_) => Ok(()),
            None => Err(StorageError::ConversationNotFound {
                user_id: user.to_string(),
                conversation_id: id.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_conversation(
        &self,
        user: &UserId,
        title: Option<&str>,
    ) -> Result<ConversationRecord, StorageError> {
        let now = now();
        let record = ConversationRecord {
            id: ConversationId::new(),
            user_id: user.clone(),
            title: title.map(str::to_string).unwrap_or_else(|| default_title(now)),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO conversations (id, user_id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(record.id.as_str())
        .bind(user.as_str())
        .bind(&record.title)
        .bind(timestamp(&record.created_at))
        .bind(timestamp(&record.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert conversation", e))?;

        debug!(conversation_id = %record.id, user = %user, "Conversation created");
        Ok(record)
    }

    async fn get_conversation(
        &self,
        user: &UserId,
        id: &ConversationId,
    ) -> Result<Option<ConversationRecord>, StorageError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?1 AND user_id = ?2")
            .bind(id.as_str())
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("get conversation", e))?;
        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn list_conversations(&self, user: &UserId) -> Result<Vec<ConversationRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE user_id = ?1 ORDER BY updated_at DESC, created_at DESC, rowid DESC",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list conversations", e))?;
        rows.iter().map(Self::row_to_conversation).collect()
    }

    async fn append_turn(
        &self,
        user: &UserId,
        id: &ConversationId,
        content: TurnContent,
    ) -> Result<Turn, StorageError> {
        content.validate()?;
        let content_json = serde_json::to_string(&content)
            .map_err(|e| StorageError::InvalidRecord(format!("turn content: {e}")))?;

        let _guard = self.locks.lock(user).await;
        let mut tx = self.pool.begin().await.map_err(|e| db_error("begin append", e))?;

        let owner: Option<String> = sqlx::query_scalar("SELECT user_id FROM conversations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("check owner", e))?;
        if owner.as_deref() != Some(user.as_str()) {
            return Err(StorageError::ConversationNotFound {
                user_id: user.to_string(),
                conversation_id: id.to_string(),
            });
        }

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM turns WHERE conversation_id = ?1",
        )
        .bind(id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("next sequence", e))?;

        let now = now();
        sqlx::query(
            "INSERT INTO turns (conversation_id, user_id, sequence, role, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(id.as_str())
        .bind(user.as_str())
        .bind(next)
        .bind(content.role().as_str())
        .bind(&content_json)
        .bind(timestamp(&now))
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("insert turn", e))?;

        sqlx::query("UPDATE conversations SET updated_at = ?1 WHERE id = ?2")
            .bind(timestamp(&now))
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("touch conversation", e))?;

        tx.commit().await.map_err(|e| db_error("commit append", e))?;

        debug!(conversation_id = %id, sequence = next, role = content.role().as_str(), "Turn appended");
        Ok(Turn {
            conversation_id: id.clone(),
            sequence: next as u64,
            content,
            timestamp: now,
        })
    }

    async fn turns(&self, user: &UserId, id: &ConversationId) -> Result<Vec<Turn>, StorageError> {
        self.ensure_owned(user, id).await?;
        let rows = sqlx::query(
            "SELECT * FROM turns WHERE conversation_id = ?1 AND user_id = ?2 ORDER BY sequence ASC",
        )
        .bind(id.as_str())
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load turns", e))?;
        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn recent_turns(
        &self,
        user: &UserId,
        id: &ConversationId,
        limit: usize,
        before: Option<u64>,
    ) -> Result<Vec<Turn>, StorageError> {
        self.ensure_owned(user, id).await?;
        let before = before.map_or(i64::MAX, |b| i64::try_from(b).unwrap_or(i64::MAX));
        let rows = sqlx::query(
            r#"
            SELECT * FROM turns
            WHERE conversation_id = ?1 AND user_id = ?2 AND sequence < ?3
            ORDER BY sequence DESC
            LIMIT ?4
            "#,
        )
        .bind(id.as_str())
        .bind(user.as_str())
        .bind(before)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load recent turns", e))?;

        let mut turns = rows.iter().map(Self::row_to_turn).collect::<Result<Vec<_>, _>>()?;
        turns.reverse();
        Ok(turns)
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, snippet: NewSnippet) -> Result<MemorySnippet, StorageError> {
        let snippet = snippet.normalized()?;
        let _guard = self.locks.lock(&snippet.user_id).await;

        let inserted = sqlx::query(
            r#"
            INSERT INTO memory_snippets (user_id, text, source_conversation_id, created_at, importance)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id, text) DO NOTHING
            "#,
        )
        .bind(snippet.user_id.as_str())
        .bind(&snippet.text)
        .bind(snippet.source_conversation_id.as_ref().map(|c| c.as_str()))
        .bind(timestamp(&now()))
        .bind(snippet.importance.map(f64::from))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert snippet", e))?
        .rows_affected();

        let row = sqlx::query("SELECT * FROM memory_snippets WHERE user_id = ?1 AND text = ?2")
            .bind(snippet.user_id.as_str())
            .bind(&snippet.text)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("read snippet", e))?;
        let stored = Self::row_to_snippet(&row)?;

        debug!(ordinal = stored.ordinal, duplicate = inserted == 0, "Snippet appended");
        Ok(stored)
    }

    async fn recent(&self, user: &UserId, lookback: usize) -> Result<Vec<MemorySnippet>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM memory_snippets WHERE user_id = ?1 ORDER BY ordinal DESC LIMIT ?2",
        )
        .bind(user.as_str())
        .bind(sql_limit(lookback))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load snippets", e))?;
        rows.iter().map(Self::row_to_snippet).collect()
    }

    async fn count(&self, user: &UserId) -> Result<usize, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memory_snippets WHERE user_id = ?1")
            .bind(user.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("count snippets", e))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memloop_core::{ToolCall, ToolResult};
    use std::sync::Arc;

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    async fn test_store() -> SqliteStore {
        SqliteStore::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn conversation_round_trip() {
        let store = test_store().await;
        let alice = user("alice");
        let created = store.create_conversation(&alice, Some("Trip planning")).await.unwrap();

        let loaded = store.get_conversation(&alice, &created.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Trip planning");
        assert_eq!(loaded.user_id, alice);
        assert_eq!(loaded.created_at, created.created_at);
    }

    #[tokio::test]
    async fn default_title_is_applied() {
        let store = test_store().await;
        let conv = store.create_conversation(&user("alice"), None).await.unwrap();
        assert!(conv.title.starts_with("Conversation "));
    }

    #[tokio::test]
    async fn turns_round_trip_with_gapless_sequences() {
        let store = test_store().await;
        let alice = user("alice");
        let conv = store.create_conversation(&alice, None).await.unwrap();

        store.append_turn(&alice, &conv.id, TurnContent::user("What's 2+2?")).await.unwrap();
        let call = ToolCall {
            id: "toolu_1".into(),
            name: "calculator".into(),
            arguments: serde_json::json!({"expression": "2+2"}),
        };
        store
            .append_turn(&alice, &conv.id, TurnContent::tool(call.clone(), ToolResult::ok("toolu_1", "4")))
            .await
            .unwrap();
        store.append_turn(&alice, &conv.id, TurnContent::assistant("4")).await.unwrap();

        let turns = store.turns(&alice, &conv.id).await.unwrap();
        assert_eq!(turns.iter().map(|t| t.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(
            turns.iter().map(|t| t.role()).collect::<Vec<_>>(),
            vec![TurnRole::User, TurnRole::Tool, TurnRole::Assistant]
        );
        match &turns[1].content {
            TurnContent::Tool { call: stored, result } => {
                assert_eq!(stored, &call);
                assert_eq!(result.output, "4");
                assert!(result.success);
            }
            other => panic!("expected tool turn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_appends_stay_gapless() {
        let store = Arc::new(test_store().await);
        let alice = user("alice");
        let conv = store.create_conversation(&alice, None).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
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
        assert_eq!(seqs, (1..=10).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn ownership_is_enforced() {
        let store = test_store().await;
        let alice = user("alice");
        let bob = user("bob");
        let conv = store.create_conversation(&alice, None).await.unwrap();

        assert!(store.get_conversation(&bob, &conv.id).await.unwrap().is_none());
        assert!(matches!(
            store.append_turn(&bob, &conv.id, TurnContent::user("hijack")).await,
            Err(StorageError::ConversationNotFound { .. })
        ));
        assert!(matches!(
            store.recent_turns(&bob, &conv.id, 10, None).await,
            Err(StorageError::ConversationNotFound { .. })
        ));
        assert!(store.turns(&alice, &conv.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_turns_respects_limit_and_before() {
        let store = test_store().await;
        let alice = user("alice");
        let conv = store.create_conversation(&alice, None).await.unwrap();
        for i in 1..=5 {
            store
                .append_turn(&alice, &conv.id, TurnContent::user(format!("t{i}")))
                .await
                .unwrap();
        }

        let window = store.recent_turns(&alice, &conv.id, 2, None).await.unwrap();
        assert_eq!(window.iter().map(|t| t.sequence).collect::<Vec<_>>(), vec![4, 5]);

        let earlier = store.recent_turns(&alice, &conv.id, 10, Some(3)).await.unwrap();
        assert_eq!(earlier.iter().map(|t| t.sequence).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn list_orders_by_last_update() {
        let store = test_store().await;
        let alice = user("alice");
        let older = store.create_conversation(&alice, Some("older")).await.unwrap();
        let _newer = store.create_conversation(&alice, Some("newer")).await.unwrap();
        store.create_conversation(&user("bob"), Some("bob's")).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.append_turn(&alice, &older.id, TurnContent::user("ping")).await.unwrap();

        let listed = store.list_conversations(&alice).await.unwrap();
        let titles: Vec<&str> = listed.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["older", "newer"]);
    }

    #[tokio::test]
    async fn snippets_deduplicate_and_isolate() {
        let store = test_store().await;
        let conv = ConversationId::from("c-1");
        let first = store
            .append(NewSnippet::new(user("a"), "Lives in Madrid").from_conversation(conv.clone()))
            .await
            .unwrap();
        let again = store.append(NewSnippet::new(user("a"), "Lives in Madrid")).await.unwrap();
        let other = store.append(NewSnippet::new(user("b"), "Lives in Madrid")).await.unwrap();

        assert_eq!(first.ordinal, again.ordinal);
        assert_eq!(again.source_conversation_id, Some(conv));
        assert_ne!(first.ordinal, other.ordinal);
        assert_eq!(store.count(&user("a")).await.unwrap(), 1);
        assert_eq!(store.count(&user("b")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recent_snippets_newest_first() {
        let store = test_store().await;
        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            store
                .append(NewSnippet::new(user("a"), *text).with_importance(i as f32 / 2.0))
                .await
                .unwrap();
        }
        let recent = store.recent(&user("a"), 2).await.unwrap();
        assert_eq!(
            recent.iter().map(|s| s.text.as_str()).collect::<Vec<_>>(),
            vec!["three", "two"]
        );
        assert_eq!(recent[0].importance, Some(1.0));
        assert!(store.recent(&user("nobody"), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data").join("memloop.sqlite");

        let store = SqliteStore::open(&path).await.unwrap();
        let alice = user("alice");
        let conv = store.create_conversation(&alice, None).await.unwrap();
        store.append_turn(&alice, &conv.id, TurnContent::user("persist me")).await.unwrap();
        store.pool.close().await;

        assert!(path.exists());
        let reopened = SqliteStore::open(&path).await.unwrap();
        let turns = reopened.turns(&alice, &conv.id).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content.text(), "persist me");
    }

    #[tokio::test]
    async fn empty_snippet_is_rejected() {
        let store = test_store().await;
        let err = store.append(NewSnippet::new(user("a"), "  ")).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(_)));
    }
}
