//! Gemini LLM client implementation (API key authentication).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

use super::super::message::{Message, Role, ToolCallRequest};
use super::{ChatOptions, GeminiResponse, LlmClient, LlmResponse, Usage};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini API client using API key authentication.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    client: Client,
}

impl GeminiClient {
    /// Create a new Gemini client with API key; `timeout` bounds every request.
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    fn build_url(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_URL, self.model, self.api_key
        )
    }

    fn convert_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "model",
                    Role::Tool => "function",
                    Role::User | Role::System => "user",
                };

                if m.role == Role::Tool {
                    json!({
                        "role": "function",
                        "parts": [{
                            "functionResponse": {
                                "name": m.tool_name.as_deref().unwrap_or("unknown"),
                                "response": {"result": m.content}
                            }
                        }]
                    })
                } else if let Some(ref tool_calls) = m.tool_calls {
                    let calls: Vec<Value> = tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "functionCall": {
                                    "name": tc.name,
                                    "args": tc.arguments
                                }
                            })
                        })
                        .collect();

                    json!({
                        "role": role,
                        "parts": calls
                    })
                } else {
                    json!({
                        "role": role,
                        "parts": [{"text": m.content}]
                    })
                }
            })
            .collect()
    }

    fn system_instruction(messages: &[Message]) -> Option<String> {
        messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone())
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Option<Value> {
        if tools.is_empty() {
            return None;
        }

        let function_declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters
                })
            })
            .collect();

        Some(json!([{
            "functionDeclarations": function_declarations
        }]))
    }

    fn parse_response(response: &GeminiResponse) -> Result<LlmResponse> {
        let candidate = response
            .candidates
            .first()
            .ok_or_else(|| Error::Llm("No candidates in response".to_string()))?;

        let mut content = None;
        let mut tool_calls = Vec::new();

        for part in &candidate.content.parts {
            if let Some(ref text) = part.text {
                content = Some(text.clone());
            }

            if let Some(ref fc) = part.function_call {
                tool_calls.push(ToolCallRequest {
                    id: format!("tc_{}", tool_calls.len()),
                    name: fc.name.clone(),
                    arguments: fc.args.clone(),
                });
            }
        }

        let usage = response
            .usage_metadata
            .as_ref()
            .map(|u| Usage {
                prompt_tokens: u.prompt_token_count.unwrap_or(0),
                completion_tokens: u.candidates_token_count.unwrap_or(0),
                total_tokens: u.total_token_count.unwrap_or(0),
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            tool_calls,
            finish_reason: candidate
                .finish_reason
                .clone()
                .unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }

    async fn generate(&self, messages: &[Message], tools: &[ToolDefinition], options: &ChatOptions) -> Result<LlmResponse> {
        let mut request = json!({
            "contents": Self::convert_messages(messages),
            "generationConfig": {
                "temperature": options.temperature,
                "maxOutputTokens": options.max_tokens
            }
        });

        if let Some(system) = Self::system_instruction(messages) {
            request["systemInstruction"] = json!({
                "parts": [{"text": system}]
            });
        }

        if let Some(tool_config) = Self::convert_tools(tools) {
            request["tools"] = tool_config;
        }

        let response = self.client.post(self.build_url()).json(&request).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(Error::Llm(format!("Gemini API error: {error_text}")));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        Self::parse_response(&gemini_response)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<String> {
        self.generate(messages, &[], options)
            .await?
            .content
            .ok_or_else(|| Error::Llm("Empty response".to_string()))
    }

    async fn chat_with_functions(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let options = ChatOptions {
            temperature: 0.7,
            max_tokens: 8192,
        };
        self.generate(messages, tools, &options).await
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_message_moves_to_instruction() {
        let messages = vec![Message::system("be brief"), Message::user("几点了")];
        assert_eq!(GeminiClient::system_instruction(&messages).as_deref(), Some("be brief"));

        let contents = GeminiClient::convert_messages(&messages);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
    }

    #[test]
    fn test_function_response_uses_tool_name() {
        let call = ToolCallRequest {
            id: "tc_0".to_string(),
            name: "system_info".to_string(),
            arguments: json!({"action": "get_time"}),
        };
        let contents = GeminiClient::convert_messages(&[Message::tool_result(&call, "Success: 10:00")]);
        assert_eq!(contents[0]["parts"][0]["functionResponse"]["name"], "system_info");
    }

    #[test]
    fn test_parse_function_call() {
        let raw = r#"{
            "candidates": [{
                "content": {"parts": [{"functionCall": {"name": "app_control", "args": {"action": "open", "app_name": "微信"}}}]},
                "finishReason": "STOP"
            }]
        }"#;
        let response = GeminiClient::parse_response(&serde_json::from_str(raw).unwrap()).unwrap();
        assert!(response.has_tool_calls());
        assert_eq!(response.tool_calls[0].arguments["app_name"], "微信");
    }
}
