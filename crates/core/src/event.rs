//! Domain events for observers of the agent loop.
//!
//! Events are published when something interesting happens in the system.
//! Subscribers (the CLI's verbose mode, tests) react without coupling to the
//! loop itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::conversation::TurnRole;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A turn was persisted
    TurnAppended {
        conversation_id: String,
        sequence: u64,
        role: TurnRole,
        timestamp: DateTime<Utc>,
    },

    /// A tool was dispatched
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Memory snippets were written for a user
    MemoryStored {
        user_id: String,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// An agent loop invocation reached a terminal state
    LoopFinished {
        conversation_id: String,
        /// "done", "max_iterations" or "cancelled"
        outcome: String,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },

    /// An invocation failed
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
