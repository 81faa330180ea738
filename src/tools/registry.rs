//! Tool registry - catalog of tools, looked up by name

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::app_control::AppControlTool;
use super::browser_control::BrowserControlTool;
use super::file_operation::FileOperationTool;
use super::media_control::MediaControlTool;
use super::scene::{SceneCatalog, SceneTool};
use super::system_info::SystemInfoTool;
use super::text_processing::TextProcessingTool;
use super::{safe_execute, Tool, ToolResult};
use crate::adapters::desktop::Desktop;
use crate::config::Config;
use crate::error::Error;
use crate::Result;

/// Tool definition for LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Outcome of running one tool directly, outside the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub tool: String,
    /// "completed" or "failed"
    pub status: String,
    #[serde(flatten)]
    pub result: ToolResult,
}

/// Registry of named tools.
///
/// Built once at startup and shared behind an `Arc`; after construction it
/// is only read, so lookups and executions need no locking.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create the shared registry with every desktop tool and the scene manager.
    ///
    /// The scene tool keeps a weak handle back to the registry it lives in so
    /// that scene steps dispatch through the same catalog.
    pub fn new_with_defaults(
        config: &Config,
        desktop: Arc<dyn Desktop>,
        scenes: SceneCatalog,
    ) -> Arc<Self> {
        Arc::new_cyclic(|registry| {
            let mut runner = Self::new();

            runner.register(AppControlTool::new(desktop.clone()));
            runner.register(FileOperationTool::new(desktop.clone(), config.files_dir.clone()));
            runner.register(BrowserControlTool::new(desktop.clone(), &config.search_engine));
            runner.register(TextProcessingTool::new(desktop.clone(), config.documents_dir.clone()));
            runner.register(MediaControlTool::new(desktop.clone(), config.documents_dir.clone()));
            runner.register(SystemInfoTool);
            runner.register(SceneTool::new(scenes, registry.clone()));

            runner
        })
    }

    /// Register a tool, replacing any previous tool with the same name
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Box::new(tool)).is_some() {
            warn!(tool = %name, "Replaced previously registered tool");
        } else {
            info!(tool = %name, "Registered tool");
        }
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All registered tools keyed by name
    pub fn get_all(&self) -> &HashMap<String, Box<dyn Tool>> {
        &self.tools
    }

    /// Get tool definitions for LLM, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values()
            .map(|t| t.to_definition())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Definition of a single tool
    pub fn definition(&self, name: &str) -> Option<ToolDefinition> {
        self.get(name).map(|t| t.to_definition())
    }

    /// Run one tool directly and wrap the result in a [`TaskReport`].
    ///
    /// Unlike [`execute`](Self::execute), an unknown name is an error.
    pub async fn run_task(&self, name: &str, params: Value) -> Result<TaskReport> {
        let Some(tool) = self.get(name) else {
            return Err(Error::Tool(format!("Tool not found: {name}")));
        };

        info!(tool = %name, "Running task");
        let result = safe_execute(tool, params).await;
        let status = if result.success { "completed" } else { "failed" };

        Ok(TaskReport {
            task_id: uuid::Uuid::new_v4().to_string(),
            tool: name.to_string(),
            status: status.to_string(),
            result,
        })
    }

    /// Execute a tool by name through [`safe_execute`].
    ///
    /// An unknown name is an ordinary failed result.
    pub async fn execute(&self, name: &str, params: Value) -> ToolResult {
        match self.get(name) {
            Some(tool) => safe_execute(tool, params).await,
            None => {
                warn!(tool = %name, "Unknown tool requested");
                ToolResult::failure(format!("Unknown tool: {name}"), "Tool not found")
            }
        }
    }

    /// Check if a tool exists
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List registered tool names, sorted
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::desktop::FakeDesktop;
    use crate::tools::testing::DummyTool;
    use serde_json::json;

    #[tokio::test]
    async fn test_registry_register_and_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(DummyTool::ok("test_tool"));

        assert!(registry.has("test_tool"));

        let result = registry.execute("test_tool", json!({})).await;
        assert!(result.success);
        assert_eq!(result.message, "test_tool done");
    }

    #[tokio::test]
    async fn test_registry_unknown_tool() {
        let registry = ToolRegistry::new();
        assert!(registry.get("unknown").is_none());

        let result = registry.execute("unknown", json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Tool not found"));
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(DummyTool::ok("same"));
        registry.register(DummyTool::failing("same"));

        assert_eq!(registry.get_all().len(), 1);
        let result = registry.execute("same", json!({})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_run_task_reports_status() {
        let mut registry = ToolRegistry::new();
        registry.register(DummyTool::ok("good"));
        registry.register(DummyTool::failing("bad"));

        let done = registry.run_task("good", json!({})).await.unwrap();
        assert_eq!(done.status, "completed");
        assert!(done.result.success);
        assert!(!done.task_id.is_empty());

        let failed = registry.run_task("bad", json!({})).await.unwrap();
        assert_eq!(failed.status, "failed");

        let report = serde_json::to_value(&done).unwrap();
        assert_eq!(report["success"], true);
        assert_eq!(report["tool"], "good");
    }

    #[tokio::test]
    async fn test_run_task_unknown_tool_is_error() {
        let registry = ToolRegistry::new();
        let result = registry.run_task("missing", json!({})).await;
        assert!(matches!(result, Err(Error::Tool(_))));
    }

    #[test]
    fn test_single_definition() {
        let mut registry = ToolRegistry::new();
        registry.register(DummyTool::ok("good"));
        assert_eq!(registry.definition("good").unwrap().name, "good");
        assert!(registry.definition("missing").is_none());
    }

    #[test]
    fn test_default_registry_contents() {
        let config = Config::default();
        let registry = ToolRegistry::new_with_defaults(
            &config,
            Arc::new(FakeDesktop::new()),
            SceneCatalog::builtin(),
        );

        assert_eq!(
            registry.tool_names(),
            vec![
                "app_control",
                "browser_control",
                "file_operation",
                "media_control",
                "scene_manager",
                "system_info",
                "text_processing",
            ]
        );

        let defs = registry.definitions();
        assert_eq!(defs.len(), 7);
        let app = defs.iter().find(|d| d.name == "app_control").unwrap();
        assert_eq!(app.parameters["required"], json!(["action", "app_name"]));
    }
}
