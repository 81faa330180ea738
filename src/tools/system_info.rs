//! System info tool - local time and date

use async_trait::async_trait;
use chrono::{Datelike, Local};
use serde_json::{json, Value};

use super::{str_param, Tool, ToolResult};
use crate::Result;

const WEEKDAYS: [&str; 7] = ["星期一", "星期二", "星期三", "星期四", "星期五", "星期六", "星期日"];

/// Answers time and date questions from the local clock
pub struct SystemInfoTool;

#[async_trait]
impl Tool for SystemInfoTool {
    fn name(&self) -> &str { "system_info" }
    fn description(&self) -> &str { "Get the current local time or date" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["get_time", "get_date"],
                    "description": "get_time = current time, get_date = today's date and weekday"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let now = Local::now();

        Ok(match str_param(&params, "action").unwrap_or_default() {
            "get_time" => {
                let time = now.format("%H:%M:%S").to_string();
                ToolResult::success_with(format!("现在是 {time}"), json!({"time": time}))
            }
            "get_date" => {
                let date = now.format("%Y-%m-%d").to_string();
                let weekday = WEEKDAYS[now.weekday().num_days_from_monday() as usize];
                ToolResult::success_with(
                    format!("今天是 {date} {weekday}"),
                    json!({"date": date, "weekday": weekday}),
                )
            }
            other => ToolResult::failure(format!("Unsupported action: {other}"), "Invalid action"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_time_and_date() {
        let time = SystemInfoTool.execute(json!({"action": "get_time"})).await.unwrap();
        assert!(time.success);
        assert_eq!(time.data.unwrap()["time"].as_str().unwrap().len(), 8);

        let date = SystemInfoTool.execute(json!({"action": "get_date"})).await.unwrap();
        assert!(date.success);
        assert!(date.message.contains("星期"));
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let result = SystemInfoTool.execute(json!({"action": "get_weather"})).await.unwrap();
        assert!(!result.success);
    }
}
