//! Intent classifier - keyword rules with optional LLM refinement

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{rules, Intent, IntentCategory};
use crate::agent::llm::{ChatOptions, LlmClient};
use crate::agent::Message;
use crate::error::Error;
use crate::Result;

/// Rule results below this confidence are sent to the LLM for a second opinion.
const REFINE_BELOW: f32 = 0.8;

/// Confidence assumed when the model omits one.
const DEFAULT_LLM_CONFIDENCE: f32 = 0.9;

/// Maps text to an [`Intent`].
pub struct IntentClassifier {
    llm: Option<Arc<dyn LlmClient>>,
    timeout: Duration,
}

/// Shape the model is asked to answer with. Every field is optional; missing
/// fields keep the rule result's value.
#[derive(Debug, Deserialize)]
struct LlmIntent {
    #[serde(rename = "type")]
    category: Option<String>,
    action: Option<String>,
    entities: Option<Map<String, Value>>,
    confidence: Option<f32>,
}

impl IntentClassifier {
    /// `timeout` bounds each refinement request.
    pub fn new(llm: Option<Arc<dyn LlmClient>>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Keyword rules only.
    pub fn rules_only() -> Self {
        Self::new(None, Duration::from_secs(0))
    }

    /// Classify `text`. Never fails: refinement problems keep the rule result.
    pub async fn classify(&self, text: &str) -> Intent {
        let intent = rules::classify(text);

        let intent = match &self.llm {
            Some(llm) if intent.confidence < REFINE_BELOW => {
                match self.refine(llm.as_ref(), text, &intent).await {
                    Ok(refined) => refined,
                    Err(e) => {
                        warn!(error = %e, "Intent refinement failed, keeping rule result");
                        intent
                    }
                }
            }
            _ => intent,
        };

        info!(
            category = %intent.category,
            action = %intent.action,
            confidence = intent.confidence,
            "Intent classified"
        );
        intent
    }

    async fn refine(&self, llm: &dyn LlmClient, text: &str, fallback: &Intent) -> Result<Intent> {
        let messages = [Message::user(Self::refinement_prompt(text))];
        let options = ChatOptions {
            temperature: 0.3,
            max_tokens: 500,
        };

        let reply = tokio::time::timeout(self.timeout, llm.chat(&messages, &options))
            .await
            .map_err(|_| Error::Timeout(self.timeout.as_secs()))??;
        debug!(reply = %reply, "Refinement reply");

        Self::parse_refinement(&reply, text, fallback)
    }

    fn refinement_prompt(text: &str) -> String {
        format!(
            r#"Classify the following desktop command and answer with JSON only.

Command: {text}

Answer format:
{{
    "type": "one of app_control, file_operation, browser_control, text_processing, media_control, scene, system_query, unknown",
    "action": "the concrete action, e.g. open, close, create, search, play",
    "entities": {{"key": "value"}},
    "confidence": 0.95
}}

Return only the JSON object."#
        )
    }

    /// Parse the model's answer, tolerating a surrounding markdown code fence.
    fn parse_refinement(reply: &str, text: &str, fallback: &Intent) -> Result<Intent> {
        let parsed: LlmIntent = serde_json::from_str(strip_code_fence(reply))?;

        let category = match parsed.category {
            Some(name) => name.parse::<IntentCategory>()?,
            None => fallback.category,
        };

        Ok(Intent {
            category,
            action: parsed
                .action
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| fallback.action.clone()),
            entities: parsed.entities.unwrap_or_else(|| fallback.entities.clone()),
            confidence: parsed.confidence.unwrap_or(DEFAULT_LLM_CONFIDENCE).clamp(0.0, 1.0),
            raw_text: text.to_string(),
        })
    }
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::FakeLlmClient;

    fn classifier(llm: FakeLlmClient) -> (IntentClassifier, Arc<FakeLlmClient>) {
        let llm = Arc::new(llm);
        (IntentClassifier::new(Some(llm.clone()), Duration::from_secs(5)), llm)
    }

    #[tokio::test]
    async fn test_confident_rule_skips_llm() {
        let (classifier, llm) = classifier(FakeLlmClient::new(vec![]));
        let intent = classifier.classify("打开微信").await;
        assert_eq!(intent.category, IntentCategory::AppControl);
        assert!(llm.seen().is_empty());
    }

    #[tokio::test]
    async fn test_refinement_replaces_unknown() {
        let reply = "```json\n{\"type\": \"media_control\", \"action\": \"play\", \"entities\": {\"music_query\": \"周杰伦\"}, \"confidence\": 0.92}\n```";
        let (classifier, _) = classifier(FakeLlmClient::new(vec![reply]));

        let intent = classifier.classify("来点周杰伦").await;
        assert_eq!(intent.category, IntentCategory::MediaControl);
        assert_eq!(intent.action, "play");
        assert_eq!(intent.entity("music_query"), Some("周杰伦"));
        assert!((intent.confidence - 0.92).abs() < f32::EPSILON);
        assert_eq!(intent.raw_text, "来点周杰伦");
    }

    #[tokio::test]
    async fn test_garbage_reply_keeps_rule_result() {
        let (classifier, _) = classifier(FakeLlmClient::new(vec!["I think you want music"]));
        let intent = classifier.classify("来点周杰伦").await;
        assert!(intent.is_unknown());
        assert_eq!(intent.confidence, rules::UNKNOWN_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_llm_error_keeps_rule_result() {
        let (classifier, _) = classifier(FakeLlmClient::failing());
        assert!(classifier.classify("来点周杰伦").await.is_unknown());
    }

    #[tokio::test]
    async fn test_timeout_keeps_rule_result() {
        let llm = Arc::new(FakeLlmClient::new(vec![r#"{"type": "scene"}"#]).delayed(Duration::from_secs(30)));
        let classifier = IntentClassifier::new(Some(llm), Duration::from_millis(50));
        assert!(classifier.classify("来点周杰伦").await.is_unknown());
    }

    #[tokio::test]
    async fn test_rules_only() {
        let intent = IntentClassifier::rules_only().classify("来点周杰伦").await;
        assert!(intent.is_unknown());
    }

    #[test]
    fn test_partial_reply_falls_back_per_field() {
        let fallback = rules::classify("你好");
        let intent = IntentClassifier::parse_refinement(r#"{"action": "greet", "confidence": 7}"#, "你好", &fallback)
            .unwrap();
        assert_eq!(intent.category, IntentCategory::Unknown);
        assert_eq!(intent.action, "greet");
        assert_eq!(intent.confidence, 1.0);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {} "), "{}");
    }
}
