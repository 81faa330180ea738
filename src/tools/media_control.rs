//! Media control tool - volume, music playback and screenshots

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};
use url::form_urlencoded;

use super::{int_param, str_param, Tool, ToolResult};
use crate::adapters::desktop::Desktop;
use crate::Result;

const MUSIC_HOME: &str = "https://music.163.com";
const MUSIC_SEARCH: &str = "https://music.163.com/#/search/m/?s=";

/// Volume, playback and screen capture
pub struct MediaControlTool {
    desktop: Arc<dyn Desktop>,
    screenshot_dir: PathBuf,
}

impl MediaControlTool {
    pub fn new(desktop: Arc<dyn Desktop>, screenshot_dir: PathBuf) -> Self {
        Self { desktop, screenshot_dir }
    }

    async fn set_volume(&self, level: Option<i64>) -> ToolResult {
        let Some(level) = level else {
            return ToolResult::failure("No volume level specified", "No level");
        };
        if !(0..=100).contains(&level) {
            return ToolResult::failure(
                format!("Volume must be between 0 and 100, got {level}"),
                "Invalid level",
            );
        }

        // Range checked above.
        let level = level as u8;
        if self.desktop.set_volume(level).await {
            ToolResult::success_with(format!("Volume set to {level}%"), json!({"level": level}))
        } else {
            ToolResult::failure("Failed to set volume", "Volume control unavailable")
        }
    }

    async fn play_music(&self, query: Option<&str>) -> ToolResult {
        let (url, message) = match query {
            Some(query) => {
                let encoded: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
                (format!("{MUSIC_SEARCH}{encoded}"), format!("Searching music: {query}"))
            }
            None => (MUSIC_HOME.to_string(), "Opened the music player".to_string()),
        };

        if self.desktop.open_url(&url).await {
            ToolResult::success_with(message, json!({"url": url}))
        } else {
            ToolResult::failure("Failed to open the music player", "Failed to open URL")
        }
    }

    async fn pause(&self) -> ToolResult {
        if self.desktop.pause_media().await {
            ToolResult::success("Toggled play/pause")
        } else {
            ToolResult::failure("Failed to pause playback", "Media keys unavailable")
        }
    }

    async fn screenshot(&self) -> ToolResult {
        if let Err(e) = std::fs::create_dir_all(&self.screenshot_dir) {
            return ToolResult::failure(format!("Failed to prepare screenshot folder: {e}"), e.to_string());
        }

        let filename = format!("screenshot_{}.png", Local::now().format("%Y%m%d_%H%M%S"));
        let path = self.screenshot_dir.join(&filename);

        if self.desktop.take_screenshot(&path).await {
            ToolResult::success_with(
                format!("Screenshot saved: {filename}"),
                json!({"path": path.display().to_string()}),
            )
        } else {
            ToolResult::failure("Failed to take screenshot", "Screen capture unavailable")
        }
    }
}

#[async_trait]
impl Tool for MediaControlTool {
    fn name(&self) -> &str { "media_control" }
    fn description(&self) -> &str { "Media control: set volume, play or pause music, take a screenshot" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["volume", "play_music", "pause", "screenshot"],
                    "description": "Operation to perform"
                },
                "level": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": 100,
                    "description": "Volume level 0-100 (for volume)"
                },
                "music_query": {
                    "type": "string",
                    "description": "Song or artist to search (for play_music)"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let action = str_param(&params, "action").unwrap_or_default();

        Ok(match action {
            "volume" | "adjust" => self.set_volume(int_param(&params, "level")).await,
            "play" | "play_music" => {
                let query = str_param(&params, "music_query").or_else(|| str_param(&params, "query"));
                self.play_music(query).await
            }
            "pause" => self.pause().await,
            "screenshot" => self.screenshot().await,
            other => ToolResult::failure(format!("Unsupported action: {other}"), "Invalid action"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::desktop::FakeDesktop;
    use tempfile::TempDir;

    fn tool(dir: &TempDir) -> (MediaControlTool, Arc<FakeDesktop>) {
        let desktop = Arc::new(FakeDesktop::new());
        (MediaControlTool::new(desktop.clone(), dir.path().to_path_buf()), desktop)
    }

    #[tokio::test]
    async fn test_volume_accepts_percent_string() {
        let tmp = TempDir::new().unwrap();
        let (tool, desktop) = tool(&tmp);

        let result = tool.execute(json!({"action": "adjust", "level": "45%"})).await.unwrap();
        assert!(result.success);
        assert_eq!(desktop.volume(), Some(45));
    }

    #[tokio::test]
    async fn test_volume_out_of_range() {
        let tmp = TempDir::new().unwrap();
        let (tool, desktop) = tool(&tmp);

        let result = tool.execute(json!({"action": "volume", "level": 150})).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Invalid level"));
        assert_eq!(desktop.volume(), None);

        let missing = tool.execute(json!({"action": "volume"})).await.unwrap();
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn test_play_music_search_and_home() {
        let tmp = TempDir::new().unwrap();
        let (tool, desktop) = tool(&tmp);

        tool.execute(json!({"action": "play_music", "music_query": "晴天"})).await.unwrap();
        tool.execute(json!({"action": "play"})).await.unwrap();

        let opened = desktop.opened();
        assert!(opened[0].starts_with(MUSIC_SEARCH));
        assert!(!opened[0].contains("晴天"));
        assert_eq!(opened[1], MUSIC_HOME);
    }

    #[tokio::test]
    async fn test_screenshot_path() {
        let tmp = TempDir::new().unwrap();
        let (tool, _) = tool(&tmp);

        let result = tool.execute(json!({"action": "screenshot"})).await.unwrap();
        assert!(result.success);
        let path = result.data.unwrap()["path"].as_str().unwrap().to_string();
        assert!(path.starts_with(&tmp.path().display().to_string()));
        assert!(path.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_pause() {
        let tmp = TempDir::new().unwrap();
        let (tool, _) = tool(&tmp);
        assert!(tool.execute(json!({"action": "pause"})).await.unwrap().success);
    }
}
