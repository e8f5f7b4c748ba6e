//! `get_weather`: deterministic mock weather for a city.
//!
//! No network access. The same city always reports the same conditions, which
//! keeps agent runs reproducible in tests and demos.

use async_trait::async_trait;
use memloop_core::error::ToolError;
use memloop_core::tool::{Tool, ToolContext, ToolResult};
use serde::Serialize;

pub struct WeatherTool;

#[derive(Debug, Serialize)]
struct Report {
    city: String,
    temperature: i32,
    condition: &'static str,
    humidity: u32,
}

const CONDITIONS: [&str; 6] = ["Sunny", "Partly cloudy", "Cloudy", "Light rain", "Windy", "Foggy"];

/// Weather for `city`, derived from a case-insensitive hash of its name.
fn report_for(city: &str) -> Report {
    let seed = city
        .trim()
        .to_lowercase()
        .bytes()
        .fold(7u32, |acc, b| acc.wrapping_mul(33) ^ u32::from(b));
    Report {
        city: city.trim().to_string(),
        temperature: (seed % 35) as i32 - 2,
        condition: CONDITIONS[(seed as usize >> 3) % CONDITIONS.len()],
        humidity: 35 + (seed >> 5) % 55,
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a city. Returns JSON with city, temperature (Celsius), condition and humidity."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City name, e.g. 'Madrid'"
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let city = arguments
            .get("city")
            .and_then(|v| v.as_str())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'city' argument".into()))?;

        let data = serde_json::to_value(report_for(city)).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "get_weather".into(),
            reason: e.to_string(),
        })?;
        Ok(ToolResult::ok("", data.to_string()).with_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memloop_core::UserId;

    fn ctx() -> ToolContext {
        ToolContext::new(UserId::new("tester").unwrap())
    }

    #[tokio::test]
    async fn returns_json_report() {
        let result = WeatherTool
            .execute(&ctx(), serde_json::json!({"city": "Madrid"}))
            .await
            .unwrap();
        assert!(result.success);
        let parsed: serde_json::Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(parsed["city"], "Madrid");
        assert!(parsed["temperature"].is_i64());
        assert!(parsed["condition"].is_string());
        assert!(parsed["humidity"].as_u64().unwrap() >= 35);
    }

    #[test]
    fn same_city_same_weather() {
        let a = report_for("Lisbon");
        let b = report_for("  lisbon ");
        assert_eq!(a.temperature, b.temperature);
        assert_eq!(a.condition, b.condition);
        assert_eq!(a.humidity, b.humidity);
    }

    #[test]
    fn values_stay_in_plausible_ranges() {
        for city in ["Tokyo", "Oslo", "Cairo", "Lima", "Perth", "Quito"] {
            let r = report_for(city);
            assert!((-2..=32).contains(&r.temperature), "{city}: {}", r.temperature);
            assert!((35..90).contains(&r.humidity), "{city}: {}", r.humidity);
        }
    }

    #[tokio::test]
    async fn missing_city_is_invalid() {
        let err = WeatherTool
            .execute(&ctx(), serde_json::json!({"city": "  "}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
