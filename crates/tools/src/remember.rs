//! `remember`: explicit memory writes requested by the model.

use async_trait::async_trait;
use memloop_core::error::ToolError;
use memloop_core::memory::MemoryStore;
use memloop_core::tool::{Tool, ToolContext, ToolResult};
use memloop_core::NewSnippet;
use std::sync::Arc;
use tracing::info;

/// Appends a snippet for the calling user, attributed to the current
/// conversation.
pub struct RememberTool {
    store: Arc<dyn MemoryStore>,
}

impl RememberTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for RememberTool {
    fn name(&self) -> &str {
        "remember"
    }

    fn description(&self) -> &str {
        "Store a short fact about the user for future conversations, such as a preference \
         or a personal detail they shared. Keep each fact to one sentence."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The fact to remember, e.g. 'Prefers metric units'"
                },
                "importance": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "description": "How important the fact is, from 0 to 1"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;

        let mut snippet = NewSnippet::new(ctx.user_id.clone(), text);
        if let Some(id) = &ctx.conversation_id {
            snippet = snippet.from_conversation(id.clone());
        }
        match arguments.get("importance") {
            None | Some(serde_json::Value::Null) => {}
            Some(v) => {
                let importance = v
                    .as_f64()
                    .ok_or_else(|| ToolError::InvalidArguments("'importance' must be a number".into()))?;
                snippet = snippet.with_importance(importance as f32);
            }
        }

        let stored = self.store.append(snippet).await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "remember".into(),
            reason: e.to_string(),
        })?;

        info!(user = %ctx.user_id, ordinal = stored.ordinal, "Snippet remembered");
        Ok(ToolResult::ok("", format!("Remembered: {}", stored.text))
            .with_data(serde_json::json!({ "ordinal": stored.ordinal })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memloop_core::{ConversationId, UserId};
    use memloop_memory::InMemoryStore;

    fn alice() -> UserId {
        UserId::new("alice").unwrap()
    }

    #[tokio::test]
    async fn stores_snippet_with_provenance() {
        let store = Arc::new(InMemoryStore::new());
        let tool = RememberTool::new(store.clone());
        let conv = ConversationId::from("conv-1");
        let ctx = ToolContext::new(alice()).in_conversation(conv.clone());

        let result = tool
            .execute(&ctx, serde_json::json!({"text": " Prefers tea over coffee ", "importance": 0.8}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "Remembered: Prefers tea over coffee");

        let stored = store.recent(&alice(), 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].source_conversation_id, Some(conv));
        assert_eq!(stored[0].importance, Some(0.8));
    }

    #[tokio::test]
    async fn empty_text_fails_execution() {
        let tool = RememberTool::new(Arc::new(InMemoryStore::new()));
        let err = tool
            .execute(&ToolContext::new(alice()), serde_json::json!({"text": "   "}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn missing_text_is_invalid() {
        let tool = RememberTool::new(Arc::new(InMemoryStore::new()));
        let err = tool
            .execute(&ToolContext::new(alice()), serde_json::json!({"importance": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
