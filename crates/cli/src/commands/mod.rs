//! Subcommand implementations and the wiring they share.

pub mod chat;
pub mod config_cmd;
pub mod conversations;
pub mod memory;

use memloop_config::AppConfig;
use memloop_core::conversation::{ConversationStore, UserId};
use memloop_core::error::StorageError;
use memloop_core::memory::MemoryStore;
use memloop_memory::{InMemoryStore, SqliteStore};
use std::sync::Arc;

/// Fallback user when neither `--user`, `MEMLOOP_USER` nor `USER` is set.
pub const DEFAULT_USER: &str = "local";

/// `--user` (or `MEMLOOP_USER`, which clap already folded in), then `$USER`.
pub fn resolve_user(flag: Option<String>) -> Result<UserId, StorageError> {
    let raw = flag
        .filter(|u| !u.trim().is_empty())
        .or_else(|| std::env::var("USER").ok().filter(|u| !u.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_USER.to_string());
    UserId::new(raw)
}

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Both stores, backed by the configured backend.
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub memory: Arc<dyn MemoryStore>,
}

pub async fn open_stores(config: &AppConfig) -> Result<Stores, StorageError> {
    match config.memory.backend.as_str() {
        "in_memory" => {
            let store = Arc::new(InMemoryStore::new());
            Ok(Stores {
                conversations: store.clone(),
                memory: store,
            })
        }
        _ => {
            let store = Arc::new(SqliteStore::open(&config.memory.database_path()).await?);
            Ok(Stores {
                conversations: store.clone(),
                memory: store,
            })
        }
    }
}
