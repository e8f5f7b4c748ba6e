//! Error types for the memloop domain.
//!
//! Each bounded context has its own `thiserror` enum. The top-level [`Error`]
//! wraps them so the agent loop can propagate any of them with `?`, and
//! [`Error::kind`] flattens the nesting back into the taxonomy callers act on.

use thiserror::Error;

/// The top-level error type for all memloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model boundary ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Conversation / memory persistence ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Tools ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// The failure kinds a caller of the agent loop can tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ToolNotFound,
    ToolExecutionFailure,
    ModelCallFailure,
    StorageFailure,
    Configuration,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Provider(_) => ErrorKind::ModelCallFailure,
            Error::Storage(_) => ErrorKind::StorageFailure,
            Error::Tool(ToolError::NotFound(_)) => ErrorKind::ToolNotFound,
            Error::Tool(ToolError::DuplicateName(_)) => ErrorKind::Configuration,
            Error::Tool(_) => ErrorKind::ToolExecutionFailure,
            Error::Config { .. } => ErrorKind::Configuration,
            Error::Serialization(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("A user id is required for every store access")]
    MissingUser,

    #[error("Conversation {conversation_id} not found for user {user_id}")]
    ConversationNotFound {
        user_id: String,
        conversation_id: String,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Duplicate tool name: {0}")]
    DuplicateName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 529,
            message: "Overloaded".into(),
        });
        assert!(err.to_string().contains("529"));
        assert!(err.to_string().contains("Overloaded"));
    }

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(
            Error::from(ProviderError::MalformedResponse("bad json".into())).kind(),
            ErrorKind::ModelCallFailure
        );
        assert_eq!(
            Error::from(StorageError::Unavailable("disk gone".into())).kind(),
            ErrorKind::StorageFailure
        );
        assert_eq!(
            Error::from(ToolError::NotFound("weather".into())).kind(),
            ErrorKind::ToolNotFound
        );
        assert_eq!(
            Error::from(ToolError::ExecutionFailed {
                tool_name: "calculator".into(),
                reason: "overflow".into(),
            })
            .kind(),
            ErrorKind::ToolExecutionFailure
        );
        assert_eq!(
            Error::from(ToolError::DuplicateName("calculator".into())).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn conversation_not_found_names_both_ids() {
        let err = StorageError::ConversationNotFound {
            user_id: "alice".into(),
            conversation_id: "c-1".into(),
        };
        let text = err.to_string();
        assert!(text.contains("alice"));
        assert!(text.contains("c-1"));
    }
}
