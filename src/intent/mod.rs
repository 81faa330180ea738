//! Intent module - from free text to a typed action request
//!
//! Classification is a cheap keyword pass ([`rules`]) optionally refined by
//! the LLM when the keyword pass is unsure ([`IntentClassifier`]).

mod classifier;
pub mod rules;

pub use classifier::IntentClassifier;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// What kind of request the user made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    AppControl,
    FileOperation,
    BrowserControl,
    TextProcessing,
    MediaControl,
    Scene,
    SystemQuery,
    Unknown,
}

impl IntentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::AppControl => "app_control",
            IntentCategory::FileOperation => "file_operation",
            IntentCategory::BrowserControl => "browser_control",
            IntentCategory::TextProcessing => "text_processing",
            IntentCategory::MediaControl => "media_control",
            IntentCategory::Scene => "scene",
            IntentCategory::SystemQuery => "system_query",
            IntentCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "app_control" => IntentCategory::AppControl,
            "file_operation" => IntentCategory::FileOperation,
            "browser_control" => IntentCategory::BrowserControl,
            "text_processing" => IntentCategory::TextProcessing,
            "media_control" => IntentCategory::MediaControl,
            "scene" | "scene_manager" => IntentCategory::Scene,
            "system_query" | "system_info" => IntentCategory::SystemQuery,
            "unknown" => IntentCategory::Unknown,
            other => return Err(Error::Validation(format!("Unknown intent category: {other}"))),
        })
    }
}

/// A classified utterance. Built fresh per utterance and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub category: IntentCategory,
    pub action: String,
    pub entities: Map<String, Value>,
    pub confidence: f32,
    pub raw_text: String,
}

impl Intent {
    pub fn unknown(raw_text: &str, confidence: f32) -> Self {
        Self {
            category: IntentCategory::Unknown,
            action: "unknown".to_string(),
            entities: Map::new(),
            confidence,
            raw_text: raw_text.to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.category == IntentCategory::Unknown
    }

    /// String entity, if present.
    pub fn entity(&self, key: &str) -> Option<&str> {
        self.entities.get(key).and_then(Value::as_str)
    }
}
