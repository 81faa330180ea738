//! Text processing tool - documents and notes

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};

use super::{str_param, Tool, ToolResult};
use crate::adapters::desktop::{process_name, Desktop};
use crate::Result;

/// Create documents and notes, or open the text editor
pub struct TextProcessingTool {
    desktop: Arc<dyn Desktop>,
    documents_dir: PathBuf,
}

impl TextProcessingTool {
    pub fn new(desktop: Arc<dyn Desktop>, documents_dir: PathBuf) -> Self {
        Self { desktop, documents_dir }
    }

    /// Keep letters (any script), digits, spaces, dashes and underscores.
    fn sanitize_title(title: &str) -> String {
        title
            .chars()
            .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .trim()
            .to_string()
    }

    async fn create_document(&self, title: Option<&str>, content: Option<&str>, format: &str) -> ToolResult {
        let title = title
            .map(Self::sanitize_title)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("document_{}", Local::now().format("%Y%m%d_%H%M%S")));
        let format = if format == "md" { "md" } else { "txt" };
        let filename = format!("{title}.{format}");
        let path = self.documents_dir.join(&filename);

        let body = match content {
            Some(content) => content.to_string(),
            None if format == "md" => format!("# {title}\n\n"),
            None => format!("{title}\n\n"),
        };

        if let Err(e) = std::fs::create_dir_all(&self.documents_dir).and_then(|_| std::fs::write(&path, body)) {
            return ToolResult::failure(format!("Failed to create document: {e}"), e.to_string());
        }

        let opened = self.desktop.open_file(&path).await;
        let message = if opened {
            format!("Created and opened document: {filename}")
        } else {
            format!("Created document: {filename}")
        };

        ToolResult::success_with(
            message,
            json!({"path": path.display().to_string(), "title": title, "format": format, "opened": opened}),
        )
    }

    async fn write_text(&self, content: Option<&str>) -> ToolResult {
        let Some(content) = content else {
            return ToolResult::failure("No text specified", "No content");
        };
        let title = format!("note_{}", Local::now().format("%Y%m%d_%H%M%S"));
        self.create_document(Some(&title), Some(content), "txt").await
    }

    async fn open_notepad(&self) -> ToolResult {
        let Some(path) = self.desktop.find_app_path("notepad").await else {
            return ToolResult::failure("No text editor found", "App not found");
        };

        match self.desktop.start_process(&path, &[]).await {
            Some(pid) => ToolResult::success_with(
                format!("Opened {}", process_name(&path)),
                json!({"pid": pid}),
            ),
            None => ToolResult::failure("Failed to open the text editor", "Failed to start process"),
        }
    }
}

#[async_trait]
impl Tool for TextProcessingTool {
    fn name(&self) -> &str { "text_processing" }
    fn description(&self) -> &str { "Text processing: create documents, save notes, or open the text editor" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["create_document", "write_text", "open_notepad"],
                    "description": "Operation to perform"
                },
                "title": {
                    "type": "string",
                    "description": "Document title"
                },
                "content": {
                    "type": "string",
                    "description": "Document or note content"
                },
                "format": {
                    "type": "string",
                    "enum": ["txt", "md"],
                    "description": "Document format, defaults to txt"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let action = str_param(&params, "action").unwrap_or_default();
        let content = str_param(&params, "content");

        Ok(match action {
            "create_document" | "create" => {
                let format = str_param(&params, "format").unwrap_or("txt");
                self.create_document(str_param(&params, "title"), content, format).await
            }
            "write_text" | "write" => self.write_text(content).await,
            "open_notepad" | "edit" => self.open_notepad().await,
            other => ToolResult::failure(format!("Unsupported action: {other}"), "Invalid action"),
        })
    }
}
