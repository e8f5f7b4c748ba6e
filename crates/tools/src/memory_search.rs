//! Memory search tool: lets the agent look up what it knows about the
//! current user on demand.
//!
//! Delegates to [`MemoryRetriever`], so results are ranked and budgeted
//! exactly like the memory block injected into the context.

use async_trait::async_trait;
use memloop_core::error::ToolError;
use memloop_core::tool::{Tool, ToolContext, ToolResult};
use memloop_memory::MemoryRetriever;

/// Characters of snippet text returned when the model gives no budget.
pub const DEFAULT_SEARCH_BUDGET: usize = 800;

pub struct MemorySearchTool {
    retriever: MemoryRetriever,
}

impl MemorySearchTool {
    pub fn new(retriever: MemoryRetriever) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search your long-term memory about the current user for relevant facts. \
         Use this when you need to recall something you were told in an earlier conversation."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for"
                },
                "budget": {
                    "type": "integer",
                    "description": "Maximum characters of memory to return (default 800)",
                    "default": DEFAULT_SEARCH_BUDGET
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let budget = match arguments.get("budget") {
            None | Some(serde_json::Value::Null) => DEFAULT_SEARCH_BUDGET,
            Some(v) => v
                .as_u64()
                .map(|b| b as usize)
                .ok_or_else(|| ToolError::InvalidArguments("'budget' must be a non-negative integer".into()))?,
        };

        let found = self
            .retriever
            .retrieve_scored(&ctx.user_id, query, budget)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "memory_search".into(),
                reason: e.to_string(),
            })?;

        if found.is_empty() {
            return Ok(ToolResult::ok("", format!("No memories found for '{query}'."))
                .with_data(serde_json::json!({ "query": query, "results": [] })));
        }

        let mut output = format!("Found {} memories for '{query}':\n", found.len());
        for (i, s) in found.iter().enumerate() {
            output.push_str(&format!(
                "{}. {} ({})\n",
                i + 1,
                s.snippet.text,
                s.snippet.created_at.format("%Y-%m-%d")
            ));
        }

        let results: Vec<serde_json::Value> = found
            .iter()
            .map(|s| {
                serde_json::json!({
                    "text": s.snippet.text,
                    "score": s.score,
                    "created_at": s.snippet.created_at.to_rfc3339(),
                })
            })
            .collect();

        Ok(ToolResult::ok("", output.trim_end())
            .with_data(serde_json::json!({ "query": query, "results": results })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memloop_core::memory::MemoryStore;
    use memloop_core::{NewSnippet, UserId};
    use memloop_memory::InMemoryStore;
    use std::sync::Arc;

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    async fn tool_with(facts: &[(&str, &str)]) -> MemorySearchTool {
        let store = Arc::new(InMemoryStore::new());
        for (owner, text) in facts {
            store.append(NewSnippet::new(user(owner), *text)).await.unwrap();
        }
        MemorySearchTool::new(MemoryRetriever::new(store, 50))
    }

    #[tokio::test]
    async fn finds_facts_for_the_calling_user() {
        let tool = tool_with(&[
            ("alice", "Lives in Madrid"),
            ("bob", "Lives in Madrid too, but is Bob"),
        ])
        .await;

        let result = tool
            .execute(&ToolContext::new(user("alice")), serde_json::json!({"query": "madrid"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("Lives in Madrid"));
        assert!(!result.output.contains("Bob"));
        assert_eq!(result.data.unwrap()["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_memory_is_not_an_error() {
        let tool = tool_with(&[]).await;
        let result = tool
            .execute(&ToolContext::new(user("alice")), serde_json::json!({"query": "anything"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.starts_with("No memories found"));
    }

    #[tokio::test]
    async fn budget_limits_output() {
        let tool = tool_with(&[("alice", "Enjoys hiking in the mountains")]).await;
        let result = tool
            .execute(
                &ToolContext::new(user("alice")),
                serde_json::json!({"query": "hiking", "budget": 5}),
            )
            .await
            .unwrap();
        assert!(result.output.starts_with("No memories found"));
    }

    #[tokio::test]
    async fn rejects_bad_arguments() {
        let tool = tool_with(&[]).await;
        let ctx = ToolContext::new(user("alice"));
        assert!(matches!(
            tool.execute(&ctx, serde_json::json!({})).await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            tool.execute(&ctx, serde_json::json!({"query": "x", "budget": -3})).await,
            Err(ToolError::InvalidArguments(_))
        ));
    }
}
