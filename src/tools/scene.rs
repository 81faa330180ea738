//! Scenes - named sequences of tool calls
//!
//! A scene is a fixed list of steps, each a tool name plus parameters. The
//! [`SceneExecutor`] runs every step in order through the registry and
//! tallies the outcome; the [`SceneTool`] exposes that as the
//! `scene_manager` tool so the agent can trigger a whole scene with one call.
//!
//! Besides the built-in scenes, a workspace may define its own in
//! `scenes.json` (a JSON array of scenes). Entries with a built-in id replace
//! the built-in.

use std::path::Path;
use std::sync::Weak;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::registry::ToolRegistry;
use super::{str_param, Tool, ToolResult};
use crate::Result;

pub const SCENE_TOOL_NAME: &str = "scene_manager";

/// One step of a scene
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneStep {
    pub tool: String,
    #[serde(default = "empty_params")]
    pub params: Value,
    #[serde(default)]
    pub description: String,
}

fn empty_params() -> Value {
    json!({})
}

impl SceneStep {
    fn new(tool: &str, params: Value, description: &str) -> Self {
        Self {
            tool: tool.to_string(),
            params,
            description: description.to_string(),
        }
    }

    fn label(&self) -> &str {
        if self.description.is_empty() {
            &self.tool
        } else {
            &self.description
        }
    }
}

/// A named scene
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<SceneStep>,
}

/// The set of scenes known at startup
#[derive(Debug, Clone, Default)]
pub struct SceneCatalog {
    scenes: Vec<Scene>,
}

impl SceneCatalog {
    /// The scenes that ship with the assistant.
    pub fn builtin() -> Self {
        let scenes = vec![
            Scene {
                id: "prepare_work".to_string(),
                name: "Prepare Work".to_string(),
                description: "Get ready to work: notepad, browser and some music".to_string(),
                steps: vec![
                    SceneStep::new("app_control", json!({"action": "open", "app_name": "记事本"}), "Open notepad"),
                    SceneStep::new("browser_control", json!({"action": "open", "url": "https://www.baidu.com"}), "Open Baidu"),
                    SceneStep::new("media_control", json!({"action": "play_music", "music_query": "轻音乐"}), "Play light music"),
                    SceneStep::new("media_control", json!({"action": "volume", "level": 30}), "Set volume to 30%"),
                ],
            },
            Scene {
                id: "create_mode".to_string(),
                name: "Create Mode".to_string(),
                description: "Get ready to create: editor, inspiration and background music".to_string(),
                steps: vec![
                    SceneStep::new("app_control", json!({"action": "open", "app_name": "notepad"}), "Open notepad"),
                    SceneStep::new("browser_control", json!({"action": "search", "query": "创作灵感"}), "Search for inspiration"),
                    SceneStep::new("media_control", json!({"action": "play_music", "music_query": "纯音乐"}), "Play instrumental music"),
                ],
            },
            Scene {
                id: "study_mode".to_string(),
                name: "Study Mode".to_string(),
                description: "Get ready to study: notes, browser and a quieter room".to_string(),
                steps: vec![
                    SceneStep::new("app_control", json!({"action": "open", "app_name": "notepad"}), "Open notepad"),
                    SceneStep::new("browser_control", json!({"action": "open", "url": "https://www.baidu.com"}), "Open Baidu"),
                    SceneStep::new("media_control", json!({"action": "volume", "level": 20}), "Lower the volume"),
                ],
            },
            Scene {
                id: "relax_mode".to_string(),
                name: "Relax Mode".to_string(),
                description: "Take a break: relaxing music and something to watch".to_string(),
                steps: vec![
                    SceneStep::new("media_control", json!({"action": "play_music", "music_query": "放松音乐"}), "Play relaxing music"),
                    SceneStep::new("media_control", json!({"action": "volume", "level": 40}), "Set volume to 40%"),
                    SceneStep::new("browser_control", json!({"action": "open", "url": "https://www.bilibili.com"}), "Open bilibili"),
                ],
            },
        ];
        Self { scenes }
    }

    /// Built-in scenes merged with `<workspace>/scenes.json` when it exists.
    ///
    /// An unreadable or malformed file is logged and ignored.
    pub fn load(workspace: &Path) -> Self {
        let mut catalog = Self::builtin();
        let path = workspace.join("scenes.json");
        if !path.exists() {
            return catalog;
        }

        let parsed = std::fs::read_to_string(&path)
            .map_err(crate::Error::from)
            .and_then(|content| serde_json::from_str::<Vec<Scene>>(&content).map_err(crate::Error::from));

        match parsed {
            Ok(scenes) => {
                info!(path = %path.display(), count = scenes.len(), "Loaded workspace scenes");
                for scene in scenes {
                    catalog.insert(scene);
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Ignoring invalid scenes file"),
        }
        catalog
    }

    /// Add a scene, replacing one with the same id.
    pub fn insert(&mut self, scene: Scene) {
        match self.scenes.iter_mut().find(|s| s.id == scene.id) {
            Some(existing) => *existing = scene,
            None => self.scenes.push(scene),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    pub fn list(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn ids(&self) -> Vec<&str> {
        self.scenes.iter().map(|s| s.id.as_str()).collect()
    }
}

/// Outcome of a single scene step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: String,
    pub tool: String,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tally of a scene run, steps in their original order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneExecutionResult {
    pub scene_name: String,
    pub total_steps: usize,
    pub success_count: usize,
    pub fail_count: usize,
    pub results: Vec<StepOutcome>,
}

impl SceneExecutionResult {
    /// A scene counts as done when at least one step worked.
    pub fn succeeded(&self) -> bool {
        self.success_count > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} completed: succeeded {}/{}, failed {}/{}",
            self.scene_name, self.success_count, self.total_steps, self.fail_count, self.total_steps
        )
    }
}

/// Runs scenes from a catalog against a registry
pub struct SceneExecutor {
    catalog: SceneCatalog,
}

impl SceneExecutor {
    pub fn new(catalog: SceneCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &SceneCatalog {
        &self.catalog
    }

    /// Run every step of `scene_id` in order; `None` if the scene is unknown.
    ///
    /// A failing step does not stop the scene.
    pub async fn run(&self, scene_id: &str, registry: &ToolRegistry) -> Option<SceneExecutionResult> {
        let scene = self.catalog.get(scene_id)?;
        info!(scene = %scene.id, steps = scene.steps.len(), "Running scene");

        let mut results = Vec::with_capacity(scene.steps.len());
        for step in &scene.steps {
            let result = if step.tool == SCENE_TOOL_NAME {
                ToolResult::failure("Scenes cannot run other scenes", "Nested scene")
            } else {
                registry.execute(&step.tool, step.params.clone()).await
            };

            if result.success {
                info!(scene = %scene.id, step = step.label(), "Scene step succeeded");
            } else {
                warn!(scene = %scene.id, step = step.label(), message = %result.message, "Scene step failed");
            }

            results.push(StepOutcome {
                step: step.label().to_string(),
                tool: step.tool.clone(),
                success: result.success,
                message: result.message,
                error: result.error,
            });
        }

        let success_count = results.iter().filter(|r| r.success).count();
        Some(SceneExecutionResult {
            scene_name: scene.name.clone(),
            total_steps: results.len(),
            success_count,
            fail_count: results.len() - success_count,
            results,
        })
    }
}

/// The `scene_manager` tool
pub struct SceneTool {
    executor: SceneExecutor,
    registry: Weak<ToolRegistry>,
}

impl SceneTool {
    /// `registry` is the registry this tool is registered in.
    pub fn new(catalog: SceneCatalog, registry: Weak<ToolRegistry>) -> Self {
        Self {
            executor: SceneExecutor::new(catalog),
            registry,
        }
    }
}

#[async_trait]
impl Tool for SceneTool {
    fn name(&self) -> &str { SCENE_TOOL_NAME }
    fn description(&self) -> &str { "Run a predefined scene, a fixed sequence of desktop actions such as preparing for work" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "scene_name": {
                    "type": "string",
                    "enum": self.executor.catalog().ids(),
                    "description": "Scene id"
                }
            },
            "required": ["scene_name"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let scene_name = str_param(&params, "scene_name").unwrap_or_default();
        let Some(registry) = self.registry.upgrade() else {
            return Err(crate::Error::Tool("Tool registry is no longer available".to_string()));
        };

        let Some(result) = self.executor.run(scene_name, &registry).await else {
            return Ok(ToolResult::failure(format!("Scene not found: {scene_name}"), "Scene not found"));
        };

        let message = result.summary();
        let data = serde_json::to_value(&result)?;
        Ok(if result.succeeded() {
            ToolResult::success_with(message, data)
        } else {
            ToolResult::failure_with(message, "All scene steps failed", data)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::tools::testing::DummyTool;
    use tempfile::TempDir;

    fn scene(id: &str, steps: &[&str]) -> Scene {
        Scene {
            id: id.to_string(),
            name: format!("{id} display"),
            description: String::new(),
            steps: steps
                .iter()
                .map(|tool| SceneStep::new(tool, json!({"action": "go"}), ""))
                .collect(),
        }
    }

    fn registry_with(scenes: SceneCatalog, tools: Vec<DummyTool>) -> Arc<ToolRegistry> {
        Arc::new_cyclic(|weak| {
            let mut registry = ToolRegistry::new();
            for tool in tools {
                registry.register(tool);
            }
            registry.register(SceneTool::new(scenes, weak.clone()));
            registry
        })
    }

    #[tokio::test]
    async fn test_partial_success_counts() {
        let mut catalog = SceneCatalog::default();
        catalog.insert(scene("mixed", &["ok", "bad", "missing", "ok"]));
        let registry = registry_with(
            catalog,
            vec![DummyTool::ok("ok"), DummyTool::failing("bad")],
        );

        let result = registry.execute(SCENE_TOOL_NAME, json!({"scene_name": "mixed"})).await;

        assert!(result.success);
        assert_eq!(result.message, "mixed display completed: succeeded 2/4, failed 2/4");
        let data: SceneExecutionResult = serde_json::from_value(result.data.unwrap()).unwrap();
        assert_eq!(data.success_count + data.fail_count, data.total_steps);
        assert_eq!(data.results.len(), 4);
        assert_eq!(data.results[2].tool, "missing");
        assert!(!data.results[2].success);
    }

    #[tokio::test]
    async fn test_all_steps_fail() {
        let mut catalog = SceneCatalog::default();
        catalog.insert(scene("doomed", &["bad", "bad"]));
        let registry = registry_with(catalog, vec![DummyTool::failing("bad")]);

        let result = registry.execute(SCENE_TOOL_NAME, json!({"scene_name": "doomed"})).await;
        assert!(!result.success);
        assert!(result.message.contains("succeeded 0/2, failed 2/2"));
    }

    #[tokio::test]
    async fn test_unknown_scene_runs_nothing() {
        let tool = DummyTool::ok("ok");
        let calls = tool.calls.clone();
        let registry = registry_with(SceneCatalog::builtin(), vec![tool]);

        let result = registry.execute(SCENE_TOOL_NAME, json!({"scene_name": "party_mode"})).await;
        assert!(!result.success);
        assert_eq!(result.message, "Scene not found: party_mode");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_nested_scene_step_refused() {
        let mut catalog = SceneCatalog::default();
        catalog.insert(scene("loop", &[SCENE_TOOL_NAME, "ok"]));
        let registry = registry_with(catalog, vec![DummyTool::ok("ok")]);

        let result = registry.execute(SCENE_TOOL_NAME, json!({"scene_name": "loop"})).await;
        assert!(result.success);
        assert!(result.message.contains("succeeded 1/2"));
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = SceneCatalog::builtin();
        assert_eq!(catalog.ids(), vec!["prepare_work", "create_mode", "study_mode", "relax_mode"]);
        assert_eq!(catalog.get("prepare_work").unwrap().steps.len(), 4);
        assert!(catalog.get("work_mode").is_none());
    }

    #[test]
    fn test_workspace_scenes_merge() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("scenes.json"),
            r#"[
                {"id": "relax_mode", "name": "Nap", "steps": [{"tool": "media_control", "params": {"action": "pause"}}]},
                {"id": "meeting", "name": "Meeting", "steps": [{"tool": "app_control"}]}
            ]"#,
        )
        .unwrap();

        let catalog = SceneCatalog::load(tmp.path());
        assert_eq!(catalog.list().len(), 5);
        assert_eq!(catalog.get("relax_mode").unwrap().name, "Nap");
        assert_eq!(catalog.get("meeting").unwrap().steps[0].params, json!({}));
    }

    #[test]
    fn test_invalid_scenes_file_ignored() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("scenes.json"), "not json").unwrap();
        assert_eq!(SceneCatalog::load(tmp.path()).list().len(), 4);
    }
}
