//! Agent loop - turns one request into tool calls and a reply
//!
//! With an LLM the loop lets the model pick tools until it answers in plain
//! text or runs out of iterations. Without one (or when the model fails
//! before anything ran) a single tool call is derived from the classified
//! intent.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::context::PromptBuilder;
use super::llm::{LlmClient, LlmResponse};
use super::message::{AgentOutput, AgentStep, Message, ToolCallRequest};
use crate::error::Error;
use crate::intent::{rules, Intent, IntentCategory, IntentClassifier};
use crate::session::HistoryEntry;
use crate::tools::{ToolDefinition, ToolRegistry};
use crate::Result;

/// Reply when no tool fits the request.
pub const UNKNOWN_REQUEST_REPLY: &str = "Sorry, I don't know how to handle that request";

/// Default bound on LLM round trips per request.
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Scene used when the requested one does not exist.
const DEFAULT_SCENE: &str = "prepare_work";

const KNOWN_SCENES: [&str; 4] = ["prepare_work", "create_mode", "study_mode", "relax_mode"];

/// How requests are turned into tool calls; fixed when the loop is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    Llm,
    Fallback,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Llm => "llm",
            AgentMode::Fallback => "fallback",
        }
    }
}

/// The agent loop processes requests through the LLM or the intent fallback
pub struct AgentLoop {
    llm: Option<Arc<dyn LlmClient>>,
    registry: Arc<ToolRegistry>,
    classifier: IntentClassifier,
    prompt: PromptBuilder,
    max_iterations: usize,
    timeout: Duration,
}

impl AgentLoop {
    /// `llm = None` selects fallback mode. `timeout` bounds each model call.
    pub fn new(
        llm: Option<Arc<dyn LlmClient>>,
        registry: Arc<ToolRegistry>,
        max_iterations: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(llm.clone(), timeout),
            llm,
            registry,
            prompt: PromptBuilder::default(),
            max_iterations: max_iterations.max(1),
            timeout,
        }
    }

    /// Number of history messages included in LLM prompts.
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.prompt = PromptBuilder::new(window);
        self
    }

    pub fn mode(&self) -> AgentMode {
        if self.llm.is_some() {
            AgentMode::Llm
        } else {
            AgentMode::Fallback
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Handle one request. `history` is the prior conversation, oldest first.
    pub async fn run(&self, input: &str, history: &[HistoryEntry]) -> AgentOutput {
        info!(mode = self.mode().as_str(), input = %input, "Agent run started");

        let output = match &self.llm {
            Some(llm) => self.run_llm(llm.as_ref(), input, history).await,
            None => {
                let intent = self.classifier.classify(input).await;
                self.run_fallback(intent).await
            }
        };

        info!(
            steps = output.intermediate_steps.len(),
            success = output.success,
            "Agent run finished"
        );
        output
    }

    async fn run_llm(&self, llm: &dyn LlmClient, input: &str, history: &[HistoryEntry]) -> AgentOutput {
        let tools = self.registry.definitions();
        let mut messages = self.prompt.build_messages(&tools, history, input);
        let mut steps: Vec<AgentStep> = Vec::new();
        let mut last_content: Option<String> = None;

        for iteration in 0..self.max_iterations {
            debug!(iteration = iteration + 1, max = self.max_iterations, "Agent iteration");

            let response = match self.call_llm(llm, &messages, &tools).await {
                Ok(response) => response,
                Err(e) if steps.is_empty() => {
                    warn!(error = %e, "LLM unavailable, using intent fallback");
                    return self.run_fallback(rules::classify(input)).await;
                }
                Err(e) => {
                    warn!(error = %e, steps = steps.len(), "LLM failed mid-run");
                    return AgentOutput::new(format!("Execution failed: {e}"), steps, false);
                }
            };

            debug!(
                tool_calls = response.tool_calls.len(),
                tokens = response.usage.total_tokens,
                "LLM responded"
            );

            if !response.has_tool_calls() {
                let output = response
                    .content
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| summarize_steps(&steps));
                return AgentOutput::new(output, steps, true);
            }

            if let Some(content) = response.content.as_ref().filter(|c| !c.trim().is_empty()) {
                last_content = Some(content.clone());
            }

            messages.push(Message::assistant_with_tools(
                response.content.clone().unwrap_or_default(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let step = self.execute_call(call).await;
                messages.push(Message::tool_result(call, step.result.to_string()));
                steps.push(step);
            }
        }

        warn!(max = self.max_iterations, "Agent reached iteration limit");
        let output = last_content.unwrap_or_else(|| summarize_steps(&steps));
        AgentOutput::new(output, steps, true)
    }

    async fn call_llm(
        &self,
        llm: &dyn LlmClient,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        tokio::time::timeout(self.timeout, llm.chat_with_functions(messages, tools))
            .await
            .map_err(|_| Error::Timeout(self.timeout.as_secs()))?
    }

    async fn execute_call(&self, call: &ToolCallRequest) -> AgentStep {
        debug!(tool = %call.name, args = %call.arguments, "Executing tool call");
        let result = self.registry.execute(&call.name, call.arguments.clone()).await;
        AgentStep {
            tool: call.name.clone(),
            tool_input: call.arguments.clone(),
            result,
        }
    }

    /// Exactly one tool call derived from the intent.
    async fn run_fallback(&self, intent: Intent) -> AgentOutput {
        let Some(tool) = tool_for(intent.category) else {
            return AgentOutput::new(UNKNOWN_REQUEST_REPLY, vec![], false);
        };
        if !self.registry.has(tool) {
            warn!(tool, "Fallback tool is not registered");
            return AgentOutput::new(format!("Tool unavailable: {tool}"), vec![], false);
        }

        let params = fallback_params(&intent);
        let result = self.registry.execute(tool, params.clone()).await;
        let success = result.success;

        AgentOutput::new(
            result.message.clone(),
            vec![AgentStep {
                tool: tool.to_string(),
                tool_input: params,
                result,
            }],
            success,
        )
    }
}

/// Tool that serves each intent category.
fn tool_for(category: IntentCategory) -> Option<&'static str> {
    match category {
        IntentCategory::AppControl => Some("app_control"),
        IntentCategory::FileOperation => Some("file_operation"),
        IntentCategory::BrowserControl => Some("browser_control"),
        IntentCategory::TextProcessing => Some("text_processing"),
        IntentCategory::MediaControl => Some("media_control"),
        IntentCategory::Scene => Some("scene_manager"),
        IntentCategory::SystemQuery => Some("system_info"),
        IntentCategory::Unknown => None,
    }
}

/// `{action} ∪ entities`, or just the scene name for scenes.
fn fallback_params(intent: &Intent) -> Value {
    if intent.category == IntentCategory::Scene {
        let scene = KNOWN_SCENES
            .iter()
            .find(|s| **s == intent.action)
            .copied()
            .unwrap_or(DEFAULT_SCENE);
        return json!({"scene_name": scene});
    }

    let mut params = Map::new();
    params.insert("action".to_string(), json!(intent.action));
    params.extend(intent.entities.clone());
    Value::Object(params)
}

/// Reply used when the model ends without text of its own.
fn summarize_steps(steps: &[AgentStep]) -> String {
    if steps.is_empty() {
        return "Done".to_string();
    }
    steps
        .iter()
        .map(|s| s.result.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
