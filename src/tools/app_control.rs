//! App control tool - open, close and inspect desktop applications

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{str_param, Tool, ToolResult};
use crate::adapters::desktop::{process_name, Desktop};
use crate::Result;

/// Open, close or check a desktop application
pub struct AppControlTool {
    desktop: Arc<dyn Desktop>,
}

impl AppControlTool {
    pub fn new(desktop: Arc<dyn Desktop>) -> Self {
        Self { desktop }
    }

    async fn open(&self, app_name: &str) -> ToolResult {
        let Some(path) = self.desktop.find_app_path(app_name).await else {
            return ToolResult::failure(format!("App not found: {app_name}"), "App not found");
        };

        if self.desktop.is_running(&process_name(&path)).await {
            return ToolResult::success_with(
                format!("{app_name} is already running"),
                json!({"status": "already_running"}),
            );
        }

        match self.desktop.start_process(&path, &[]).await {
            Some(pid) => ToolResult::success_with(
                format!("Opened {app_name}"),
                json!({"pid": pid, "app_path": path.display().to_string()}),
            ),
            None => ToolResult::failure(format!("Failed to open {app_name}"), "Failed to start process"),
        }
    }

    async fn close(&self, app_name: &str) -> ToolResult {
        let Some(path) = self.desktop.find_app_path(app_name).await else {
            return ToolResult::failure(format!("App not found: {app_name}"), "App not found");
        };

        let process = process_name(&path);
        if !self.desktop.is_running(&process).await {
            return ToolResult::success_with(
                format!("{app_name} is not running"),
                json!({"status": "not_running"}),
            );
        }

        if self.desktop.kill_by_name(&process).await {
            ToolResult::success_with(format!("Closed {app_name}"), json!({"process_name": process}))
        } else {
            ToolResult::failure(format!("Failed to close {app_name}"), "Failed to kill process")
        }
    }

    async fn check(&self, app_name: &str) -> ToolResult {
        let Some(path) = self.desktop.find_app_path(app_name).await else {
            return ToolResult::failure(format!("App not found: {app_name}"), "App not found");
        };

        let is_running = self.desktop.is_running(&process_name(&path)).await;
        let state = if is_running { "is running" } else { "is not running" };
        ToolResult::success_with(format!("{app_name} {state}"), json!({"is_running": is_running}))
    }
}

#[async_trait]
impl Tool for AppControlTool {
    fn name(&self) -> &str { "app_control" }
    fn description(&self) -> &str { "Control desktop applications: open, close, or check whether an app is running" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["open", "close", "check"],
                    "description": "open = launch the app, close = quit it, check = report whether it runs"
                },
                "app_name": {
                    "type": "string",
                    "description": "Application name, e.g. 微信, Chrome, VS Code"
                }
            },
            "required": ["action", "app_name"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let action = str_param(&params, "action").unwrap_or_default();
        let Some(app_name) = str_param(&params, "app_name") else {
            return Ok(ToolResult::failure("No application specified", "No app_name provided"));
        };

        Ok(match action {
            "open" => self.open(app_name).await,
            "close" => self.close(app_name).await,
            "check" => self.check(app_name).await,
            other => ToolResult::failure(format!("Unsupported action: {other}"), "Invalid action"),
        })
    }
}
