//! The agent loop of memloop.
//!
//! The agent follows a **Plan → Act → Observe** cycle:
//!
//! 1. **Receive** a user message and append it to the conversation
//! 2. **Build context** (system prompt + recalled memory + recent history)
//! 3. **Send to the model** through a blocking or streaming response source
//! 4. **If tool calls**: dispatch them, persist the results, loop back to step 3
//! 5. **If text response**: persist it and return it to the caller
//!
//! The loop continues until the model responds with text only, the
//! iteration cap is reached, or the caller cancels.

pub mod context;
pub mod extract;
pub mod loop_runner;
pub mod source;
pub mod stream_event;
pub mod testing;

pub use context::{
    AssembledContext, AssemblerConfig, AssemblyMetadata, ContextAssembler, MEMORY_HEADER,
    render_memory_block,
};
pub use extract::{ExchangeSummary, SnippetExtractor};
pub use loop_runner::{AbortReason, AgentLoop, LoopConfig, LoopOutcome, LoopState, Terminal};
pub use source::{BlockingSource, ModelReply, ResponseSource, StreamAccumulator, StreamingSource};
pub use stream_event::AgentStreamEvent;
pub use tokio_util::sync::CancellationToken;
