//! # memloop core
//!
//! Domain types, traits, and error definitions for the memloop agent runtime.
//! Nothing in here performs I/O: the stores, the model client, and the tools
//! are traits implemented by the other crates of the workspace.
//!
//! ## Layout
//!
//! - [`conversation`]: users, conversations and the append-only turn log
//! - [`memory`]: cross-conversation memory snippets
//! - [`tool`]: the `Tool` trait and the ordered `ToolRegistry`
//! - [`provider`]: the model boundary, blocking and streaming
//! - [`event`]: domain events broadcast to observers

pub mod error;
pub mod message;
pub mod conversation;
pub mod memory;
pub mod provider;
pub mod tool;
pub mod event;

pub use error::{Error, ErrorKind, Result};
pub use message::{Message, MessageToolCall, Role};
pub use conversation::{
    ConversationId, ConversationRecord, ConversationStore, Turn, TurnContent, TurnRole, UserId,
};
pub use memory::{MemorySnippet, MemoryStore, NewSnippet};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamEvent, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolContext, ToolRegistry, ToolResult};
pub use event::{DomainEvent, EventBus};
