//! Tools module - desktop capabilities
//!
//! Tools are the actions the assistant can take on the desktop: controlling
//! applications, files, the browser, documents, media and scenes. Every tool
//! reports its outcome as a [`ToolResult`]; [`safe_execute`] is the single
//! place where validation failures, errors and panics are folded into that
//! shape.

mod registry;
pub mod app_control;
pub mod browser_control;
pub mod file_operation;
pub mod media_control;
pub mod scene;
pub mod system_info;
pub mod text_processing;

pub use registry::{TaskReport, ToolDefinition, ToolRegistry};
pub use scene::{Scene, SceneCatalog, SceneExecutionResult, SceneExecutor, SceneStep, SceneTool, StepOutcome};

use std::fmt;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::Result;

/// Uniform outcome of a tool invocation.
///
/// `error` is only ever set on failures and `message` is never empty; the
/// constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Successful result with a summary message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: non_empty(message.into(), "Done"),
            data: None,
            error: None,
        }
    }

    /// Successful result carrying a structured payload.
    pub fn success_with(message: impl Into<String>, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::success(message)
        }
    }

    /// Failed result with a user-facing message and a machine-readable reason.
    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: non_empty(message.into(), "Failed"),
            data: None,
            error: Some(non_empty(error.into(), "unknown error")),
        }
    }

    /// Failed result carrying a structured payload.
    pub fn failure_with(message: impl Into<String>, error: impl Into<String>, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::failure(message, error)
        }
    }
}

/// Observation text fed back to the model.
impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            write!(f, "Success: {}", self.message)
        } else {
            write!(
                f,
                "Failure: {} ({})",
                self.message,
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

fn non_empty(s: String, fallback: &str) -> String {
    if s.trim().is_empty() {
        fallback.to_string()
    } else {
        s
    }
}

/// Tool trait - interface for all desktop tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in function calls and registry lookups
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters(&self) -> Value;

    /// Names listed under `required` in the parameter schema
    fn required_params(&self) -> Vec<String> {
        self.parameters()
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Execute the tool with given parameters.
    ///
    /// Expected failures (app not found, bad action) come back as a failed
    /// [`ToolResult`]; `Err` is reserved for faults the tool did not expect.
    async fn execute(&self, params: Value) -> Result<ToolResult>;

    /// Convert to tool definition for LLM
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Validate required parameters, then run the tool, converting any error or
/// panic into a failed [`ToolResult`].
pub async fn safe_execute(tool: &dyn Tool, params: Value) -> ToolResult {
    if let Err(reason) = validate_params(tool, &params) {
        warn!(tool = tool.name(), %reason, "Parameter validation failed");
        return ToolResult::failure("Parameter validation failed", reason);
    }

    info!(tool = tool.name(), params = %params, "Executing tool");

    match AssertUnwindSafe(tool.execute(params)).catch_unwind().await {
        Ok(Ok(result)) => {
            if result.success {
                info!(tool = tool.name(), message = %result.message, "Tool succeeded");
            } else {
                warn!(
                    tool = tool.name(),
                    error = result.error.as_deref().unwrap_or_default(),
                    "Tool failed"
                );
            }
            result
        }
        Ok(Err(e)) => {
            error!(tool = tool.name(), error = %e, "Tool raised an error");
            ToolResult::failure("Tool execution error", e.to_string())
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!(tool = tool.name(), error = %reason, "Tool panicked");
            ToolResult::failure("Tool execution error", reason)
        }
    }
}

fn validate_params(tool: &dyn Tool, params: &Value) -> std::result::Result<(), String> {
    let Some(object) = params.as_object() else {
        return Err("Parameters must be a JSON object".to_string());
    };

    for name in tool.required_params() {
        match object.get(&name) {
            None | Some(Value::Null) => return Err(format!("Missing required parameter: {name}")),
            Some(_) => {}
        }
    }

    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: unknown payload".to_string()
    }
}

/// Trimmed, non-empty string parameter.
pub(crate) fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Integer parameter; models sometimes send numbers as strings or floats.
pub(crate) fn int_param(params: &Value, key: &str) -> Option<i64> {
    match params.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Mock tools shared by the registry, scene and agent tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::error::Error;

    /// Returns a fixed result and counts invocations.
    pub struct DummyTool {
        pub name: String,
        pub result: ToolResult,
        pub required: Vec<&'static str>,
        pub calls: Arc<AtomicUsize>,
    }

    impl DummyTool {
        pub fn ok(name: &str) -> Self {
            Self {
                name: name.to_string(),
                result: ToolResult::success(format!("{name} done")),
                required: vec![],
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn failing(name: &str) -> Self {
            Self {
                result: ToolResult::failure(format!("{name} failed"), "boom"),
                ..Self::ok(name)
            }
        }

        pub fn requiring(mut self, params: &[&'static str]) -> Self {
            self.required = params.to_vec();
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Tool for DummyTool {
        fn name(&self) -> &str { &self.name }
        fn description(&self) -> &str { "Dummy tool for testing" }

        fn parameters(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {}, "required": self.required})
        }

        async fn execute(&self, _params: Value) -> Result<ToolResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    /// Returns `Err` from `execute`.
    pub struct ErroringTool;

    #[async_trait]
    impl Tool for ErroringTool {
        fn name(&self) -> &str { "erroring" }
        fn description(&self) -> &str { "Always errors" }
        fn parameters(&self) -> Value { serde_json::json!({"type": "object"}) }

        async fn execute(&self, _params: Value) -> Result<ToolResult> {
            Err(Error::Tool("disk on fire".to_string()))
        }
    }

    /// Panics inside `execute`.
    pub struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str { "panicking" }
        fn description(&self) -> &str { "Always panics" }
        fn parameters(&self) -> Value { serde_json::json!({"type": "object"}) }

        async fn execute(&self, _params: Value) -> Result<ToolResult> {
            panic!("unexpected state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_invariants() {
        let ok = ToolResult::success("");
        assert!(ok.success);
        assert!(ok.error.is_none());
        assert!(!ok.message.is_empty());

        let failed = ToolResult::failure("", "");
        assert!(!failed.success);
        assert!(!failed.message.is_empty());
        assert!(!failed.error.unwrap().is_empty());
    }

    #[test]
    fn test_observation_text() {
        assert_eq!(ToolResult::success("Opened 微信").to_string(), "Success: Opened 微信");
        assert_eq!(
            ToolResult::failure("App not found: x", "App not found").to_string(),
            "Failure: App not found: x (App not found)"
        );
    }

    #[tokio::test]
    async fn test_missing_required_param_skips_execute() {
        let tool = DummyTool::ok("app_control").requiring(&["action", "app_name"]);

        let result = safe_execute(&tool, json!({"action": "open"})).await;

        assert!(!result.success);
        assert_eq!(result.message, "Parameter validation failed");
        assert!(result.error.unwrap().contains("app_name"));
        assert_eq!(tool.call_count(), 0);
    }

    #[tokio::test]
    async fn test_null_required_param_is_missing() {
        let tool = DummyTool::ok("t").requiring(&["action"]);
        let result = safe_execute(&tool, json!({"action": null})).await;
        assert!(!result.success);
        assert_eq!(tool.call_count(), 0);
    }

    #[tokio::test]
    async fn test_non_object_params_rejected() {
        let tool = DummyTool::ok("t");
        let result = safe_execute(&tool, json!("open")).await;
        assert!(!result.success);
        assert_eq!(tool.call_count(), 0);
    }

    #[tokio::test]
    async fn test_error_is_wrapped() {
        let result = safe_execute(&ErroringTool, json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("disk on fire"));
    }

    #[tokio::test]
    async fn test_panic_is_wrapped() {
        let result = safe_execute(&PanickingTool, json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unexpected state"));
    }

    #[tokio::test]
    async fn test_valid_params_execute_once() {
        let tool = DummyTool::ok("t").requiring(&["action"]);
        let result = safe_execute(&tool, json!({"action": "open"})).await;
        assert!(result.success);
        assert_eq!(tool.call_count(), 1);
    }

    #[test]
    fn test_param_helpers() {
        let params = json!({"a": "  x ", "b": "", "n": 30, "s": "45%", "f": 12.6});
        assert_eq!(str_param(&params, "a"), Some("x"));
        assert_eq!(str_param(&params, "b"), None);
        assert_eq!(int_param(&params, "n"), Some(30));
        assert_eq!(int_param(&params, "s"), Some(45));
        assert_eq!(int_param(&params, "f"), Some(13));
        assert_eq!(int_param(&params, "missing"), None);
    }
}
