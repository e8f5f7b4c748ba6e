//! Context assembly pipeline.
//!
//! | Block | Source | Trim Strategy |
//! |-------|--------|---------------|
//! | 1. System | Configured prompt | Never trimmed |
//! | 2. Memory | Memory retriever | Bounded by its own character budget |
//! | 3. Conversation History | Recent turns | Oldest turns dropped |
//! | 4. User message | Caller | Never trimmed |

pub mod assembler;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblerConfig, AssemblyMetadata, ContextAssembler, MEMORY_HEADER,
    render_memory_block,
};
