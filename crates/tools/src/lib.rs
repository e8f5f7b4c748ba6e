//! Built-in tool implementations for memloop.
//!
//! Tools give the agent a few things it should not guess at: arithmetic,
//! the weather, the clock, and its own long-term memory of the user.

pub mod calculator;
pub mod memory_search;
pub mod remember;
pub mod time;
pub mod weather;

use memloop_core::error::ToolError;
use memloop_core::memory::MemoryStore;
use memloop_core::tool::ToolRegistry;
use memloop_memory::MemoryRetriever;
use std::sync::Arc;

pub use calculator::CalculatorTool;
pub use memory_search::MemorySearchTool;
pub use remember::RememberTool;
pub use time::TimeTool;
pub use weather::WeatherTool;

/// Stores backing the memory tools.
pub struct MemoryTools {
    pub store: Arc<dyn MemoryStore>,
    pub retriever: MemoryRetriever,
}

/// Create a registry with all built-in tools, in a fixed order.
///
/// `remember` and `memory_search` are only registered when `memory` is given.
pub fn default_registry(memory: Option<MemoryTools>) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CalculatorTool))?;
    registry.register(Box::new(WeatherTool))?;
    registry.register(Box::new(TimeTool))?;
    if let Some(memory) = memory {
        registry.register(Box::new(RememberTool::new(memory.store)))?;
        registry.register(Box::new(MemorySearchTool::new(memory.retriever)))?;
    }
    Ok(registry)
}
