//! `get_time`: the current local date and time.

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use memloop_core::error::ToolError;
use memloop_core::tool::{Tool, ToolContext, ToolResult};

pub struct TimeTool;

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn render<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format(TIME_FORMAT).to_string()
}

#[async_trait]
impl Tool for TimeTool {
    fn name(&self) -> &str {
        "get_time"
    }

    fn description(&self) -> &str {
        "Get the current local date and time as 'YYYY-MM-DD HH:MM:SS'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _ctx: &ToolContext, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let now = Local::now();
        Ok(ToolResult::ok("", render(&now))
            .with_data(serde_json::json!({ "rfc3339": now.to_rfc3339() })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use memloop_core::UserId;

    #[test]
    fn renders_fixed_format() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 8, 4, 9).unwrap();
        assert_eq!(render(&at), "2026-10-16 08:04:09");
    }

    #[tokio::test]
    async fn returns_current_time() {
        let ctx = ToolContext::new(UserId::new("tester").unwrap());
        let result = TimeTool.execute(&ctx, serde_json::json!({})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output.len(), 19);
        assert!(chrono::NaiveDateTime::parse_from_str(&result.output, TIME_FORMAT).is_ok());
    }
}
