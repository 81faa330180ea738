//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::Result;
use crate::error::Error;

/// Default OpenAI-compatible endpoint (DashScope compatible mode).
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

const SEARCH_ENGINES: [&str; 3] = ["baidu", "google", "bing"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory path (sessions, scenes.json)
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// LLM provider to use ("openai" for any OpenAI-compatible endpoint, "gemini")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key; empty means no LLM and the assistant runs on keyword rules
    #[serde(default)]
    pub api_key: String,

    /// Base URL for the "openai" provider
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tool iterations per request
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Timeout for each LLM request, in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// History messages included in LLM prompts
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Base directory for relative file paths
    #[serde(default = "default_user_dir")]
    pub files_dir: PathBuf,

    /// Where documents, notes and screenshots are saved
    #[serde(default = "default_user_dir")]
    pub documents_dir: PathBuf,

    /// Default web search engine (baidu, google, bing)
    #[serde(default = "default_search_engine")]
    pub search_engine: String,
}

fn default_workspace() -> PathBuf {
    config_dir().join("workspace")
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    "qwen-turbo".to_string()
}

fn default_max_iterations() -> usize {
    5
}

fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_history_window() -> usize {
    5
}

fn default_user_dir() -> PathBuf {
    dirs::desktop_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_search_engine() -> String {
    "baidu".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            provider: default_provider(),
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            max_iterations: default_max_iterations(),
            llm_timeout_secs: default_llm_timeout_secs(),
            history_window: default_history_window(),
            files_dir: default_user_dir(),
            documents_dir: default_user_dir(),
            search_engine: default_search_engine(),
        }
    }
}

impl Config {
    /// Whether an LLM is configured.
    pub fn has_llm(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Apply `VOICEPC_*` overrides from `lookup` (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("VOICEPC_API_KEY") {
            self.api_key = key;
        }
        if let Some(model) = non_empty("VOICEPC_MODEL") {
            self.model = model;
        }
        if let Some(url) = non_empty("VOICEPC_BASE_URL") {
            self.base_url = url;
        }
        if let Some(provider) = non_empty("VOICEPC_PROVIDER") {
            self.provider = provider;
        }
    }

    /// Reject settings the assistant cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::Config("max_iterations must be at least 1".to_string()));
        }
        if self.llm_timeout_secs == 0 {
            return Err(Error::Config("llm_timeout_secs must be at least 1".to_string()));
        }
        if !SEARCH_ENGINES.contains(&self.search_engine.as_str()) {
            return Err(Error::Config(format!(
                "Unknown search engine '{}', expected one of: {}",
                self.search_engine,
                SEARCH_ENGINES.join(", ")
            )));
        }
        Ok(())
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".voicepc")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration: file (if any), then environment overrides.
///
/// A missing file is not an error; defaults run in keyword-rule mode.
pub fn load() -> Result<Config> {
    let mut config = load_from(&config_path())?;
    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Load configuration from a specific file, defaults if it does not exist
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid config at {}: {e}", path.display())))
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    save_to(config, &config_path())
}

fn save_to(config: &Config, path: &Path) -> Result<()> {
    // Create parent directory
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Initialize configuration and workspace
pub fn onboard() -> Result<()> {
    use crate::ui;
    use inquire::{Confirm, Select, Text};

    let prompt_err = |e: inquire::InquireError| Error::Config(format!("Prompt failed: {e}"));

    ui::print_header("Setup Wizard", "local");
    println!("  Welcome! A few questions and VoicePC is ready.\n");

    let mut config = Config::default();

    // 1. Select Provider
    let providers = vec![
        "DashScope / OpenAI-compatible (API key)",
        "Gemini (API key)",
        "None (keyword rules only)",
    ];
    let provider_choice = Select::new("Choose your AI provider:", providers)
        .prompt()
        .map_err(prompt_err)?;

    if provider_choice.starts_with("None") {
        ui::print_step("No model configured; commands are matched by keywords.");
    } else {
        if provider_choice.starts_with("Gemini") {
            config.provider = "gemini".to_string();
            config.model = "gemini-2.0-flash".to_string();
        } else {
            let base_url = Text::new("Base URL:")
                .with_default(DEFAULT_BASE_URL)
                .prompt()
                .map_err(prompt_err)?;
            config.base_url = base_url;
        }

        config.api_key = Text::new("Enter your API key:").prompt().map_err(prompt_err)?;
        config.model = Text::new("Model:")
            .with_default(&config.model)
            .prompt()
            .map_err(prompt_err)?;
    }

    // 2. Confirm Workspace
    ui::print_step(&format!("Default workspace is at {}", config.workspace.display()));
    let keep_path = Confirm::new("Use default workspace path?")
        .with_default(true)
        .prompt()
        .map_err(prompt_err)?;

    if !keep_path {
        let new_path = Text::new("Enter custom workspace path:").prompt().map_err(prompt_err)?;
        config.workspace = PathBuf::from(new_path);
    }

    // 3. Setup Folders
    ui::print_thinking("Creating directories");
    std::fs::create_dir_all(config.workspace.join("sessions"))?;

    // 4. Save Config
    ui::print_thinking("Saving configuration");
    save(&config)?;

    println!();
    ui::print_success("Setup complete!");
    ui::print_step("Run 'voicepc agent' to start giving commands.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "qwen-turbo");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.llm_timeout_secs, 30);
        assert_eq!(config.history_window, 5);
        assert!(!config.has_llm());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.model, config.model);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = serde_json::from_str(r#"{"api_key": "sk-1", "search_engine": "bing"}"#).unwrap();
        assert!(parsed.has_llm());
        assert_eq!(parsed.search_engine, "bing");
        assert_eq!(parsed.max_iterations, 5);
    }

    #[test]
    fn test_missing_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_from(&tmp.path().join("config.json")).unwrap();
        assert_eq!(config.model, "qwen-turbo");
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.json");
        let config = Config {
            model: "qwen-plus".to_string(),
            ..Config::default()
        };
        save_to(&config, &path).unwrap();
        assert_eq!(load_from(&path).unwrap().model, "qwen-plus");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env = HashMap::from([
            ("VOICEPC_API_KEY", "sk-env"),
            ("VOICEPC_MODEL", "qwen-max"),
            ("VOICEPC_PROVIDER", ""),
        ]);
        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_key, "sk-env");
        assert_eq!(config.model, "qwen-max");
        assert_eq!(config.provider, "openai");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            search_engine: "altavista".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_iterations: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
