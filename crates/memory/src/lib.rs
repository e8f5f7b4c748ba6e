//! Persistence and retrieval for memloop.
//!
//! - [`InMemoryStore`]: both stores behind one lock, for tests and ephemeral sessions
//! - [`SqliteStore`]: durable stores in a single SQLite file
//! - [`MemoryRetriever`]: budgeted, deterministic snippet selection

pub mod locks;
pub mod in_memory;
pub mod retriever;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use locks::UserLocks;
pub use in_memory::InMemoryStore;
pub use retriever::{MemoryRetriever, ScoredSnippet};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
