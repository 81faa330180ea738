//! OpenAI-compatible LLM client.
//!
//! Works with any endpoint exposing `/chat/completions` in the OpenAI shape:
//! DashScope compatible mode (the default), OpenAI, DeepSeek, Ollama, vLLM.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

use super::super::message::{Message, ToolCallRequest};
use super::{ChatOptions, ChatResponse, LlmClient, LlmResponse, Usage};

/// Client for an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiClient {
    /// Create a client; `timeout` bounds every HTTP request.
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        })
    }

    fn convert_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                let mut value = json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                });

                if let Some(ref id) = m.tool_call_id {
                    value["tool_call_id"] = json!(id);
                }

                if let Some(ref calls) = m.tool_calls {
                    let calls: Vec<Value> = calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments.to_string()
                                }
                            })
                        })
                        .collect();
                    value["tool_calls"] = json!(calls);
                }

                value
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters
                    }
                })
            })
            .collect()
    }

    /// Models send arguments as a JSON string; a malformed string is kept
    /// verbatim so the tool's validation reports it.
    fn parse_arguments(raw: &str) -> Value {
        if raw.trim().is_empty() {
            return json!({});
        }
        serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!(error = %e, "Tool call arguments are not valid JSON");
            Value::String(raw.to_string())
        })
    }

    fn parse_response(response: ChatResponse) -> Result<LlmResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("No choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, tc)| ToolCallRequest {
                id: tc.id.unwrap_or_else(|| format!("call_{i}")),
                arguments: Self::parse_arguments(&tc.function.arguments),
                name: tc.function.name,
            })
            .collect();

        let usage = response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content: choice.message.content.filter(|c| !c.is_empty()),
            tool_calls,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }

    async fn complete(&self, body: Value) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::Llm("Invalid API key or insufficient permissions".to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_text, "Provider returned error");
            return Err(Error::Llm(format!("API error {status}: {error_text}")));
        }

        let parsed: ChatResponse = response.json().await?;
        Self::parse_response(parsed)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": Self::convert_messages(messages),
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });

        let response = self.complete(body).await?;
        response
            .content
            .ok_or_else(|| Error::Llm("Empty response".to_string()))
    }

    async fn chat_with_functions(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let mut body = json!({
            "model": self.model,
            "messages": Self::convert_messages(messages),
            "temperature": 0.7,
        });

        if !tools.is_empty() {
            body["tools"] = json!(Self::convert_tools(tools));
            body["tool_choice"] = json!("auto");
        }

        self.complete(body).await
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}
