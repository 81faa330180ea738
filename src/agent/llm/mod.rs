//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable LLM providers
//! - [`ProviderRegistry`] for creating the configured provider
//! - Concrete implementations: OpenAI-compatible endpoints, Gemini
//!
//! # Adding a New Provider
//!
//! 1. Create a new file (e.g., `ollama.rs`)
//! 2. Implement `LlmClient` trait
//! 3. Add to `ProviderRegistry::create()`
//! 4. Add config fields in `config.rs`

mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

pub use types::*;

// Re-export concrete implementations
pub mod gemini;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use super::message::{Message, ToolCallRequest};

/// Sampling options for plain chat requests.
#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Text content of the response.
    pub content: Option<String>,

    /// Tool calls requested by the LLM.
    pub tool_calls: Vec<ToolCallRequest>,

    /// Reason the response finished.
    pub finish_reason: String,

    /// Token usage statistics.
    pub usage: Usage,
}

impl LlmResponse {
    /// Create a simple text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: vec![],
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    /// Create a response that only requests tool calls.
    pub fn calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls,
            finish_reason: "tool_calls".to_string(),
            usage: Usage::default(),
        }
    }

    /// Check if response has tool calls.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// LLM client trait — swappable provider abstraction.
///
/// Any `Err` means the model is unavailable for this request; callers fall
/// back rather than fail the turn.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Plain completion, returning the text of the reply.
    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<String>;

    /// Completion with function calling enabled.
    async fn chat_with_functions(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse>;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;
}

/// Provider registry — creates LLM clients from configuration.
///
/// # Example
///
/// ```ignore
/// if let Some(client) = ProviderRegistry::create(&config)? {
///     let reply = client.chat(&messages, &ChatOptions::default()).await?;
/// }
/// ```
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Create an LLM client from configuration.
    ///
    /// Returns `Ok(None)` when no API key is configured; the assistant then
    /// runs in fallback mode.
    ///
    /// Supported providers:
    /// - `"openai"`: any OpenAI-compatible chat completions endpoint
    /// - `"gemini"`: Gemini API with API key authentication
    pub fn create(config: &Config) -> Result<Option<Arc<dyn LlmClient>>> {
        if config.api_key.trim().is_empty() {
            return Ok(None);
        }

        let timeout = Duration::from_secs(config.llm_timeout_secs);
        let client: Arc<dyn LlmClient> = match config.provider.as_str() {
            "openai" => Arc::new(OpenAiClient::new(&config.base_url, &config.api_key, &config.model, timeout)?),
            "gemini" => Arc::new(GeminiClient::new(&config.api_key, &config.model, timeout)?),
            other => return Err(Error::Config(format!("Unknown provider: {other}"))),
        };
        Ok(Some(client))
    }

    /// List available provider names.
    pub fn available() -> &'static [&'static str] {
        &["openai", "gemini"]
    }
}

/// Fake LLM client for testing.
///
/// Both `chat` and `chat_with_functions` consume the same scripted queue; an
/// exhausted queue is an error.
#[cfg(test)]
pub struct FakeLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<LlmResponse>>>,
    delay: Option<Duration>,
    seen: std::sync::Mutex<Vec<Vec<Message>>>,
}

#[cfg(test)]
impl FakeLlmClient {
    /// Create with predefined text responses.
    pub fn new(responses: Vec<&str>) -> Self {
        Self::scripted(responses.into_iter().map(|s| Ok(LlmResponse::text(s))).collect())
    }

    /// Create from an explicit script of responses and errors.
    pub fn scripted(responses: Vec<Result<LlmResponse>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            delay: None,
            seen: Default::default(),
        }
    }

    /// Create with a single tool call followed by a text response.
    pub fn with_tool_call(name: &str, args: serde_json::Value, final_response: &str) -> Self {
        Self::scripted(vec![
            Ok(LlmResponse::calls(vec![ToolCallRequest {
                id: "tc_1".to_string(),
                name: name.to_string(),
                arguments: args,
            }])),
            Ok(LlmResponse::text(final_response)),
        ])
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self::scripted(vec![])
    }

    /// Sleep before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Message lists received so far, one entry per call.
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }

    async fn next(&self, messages: &[Message]) -> Result<LlmResponse> {
        self.seen.lock().unwrap().push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Llm("No more fake responses".to_string())))
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn chat(&self, messages: &[Message], _options: &ChatOptions) -> Result<String> {
        Ok(self.next(messages).await?.content.unwrap_or_default())
    }

    async fn chat_with_functions(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        self.next(messages).await
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }
}
