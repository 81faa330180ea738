//! Prompt construction for the LLM agent.
//!
//! - System instruction enumerating the registered tools
//! - History windowing (last N messages)
//! - Current user input last

use crate::session::HistoryEntry;
use crate::tools::ToolDefinition;

use super::message::{Message, Role};

/// Default number of history messages included in a prompt.
pub const DEFAULT_HISTORY_WINDOW: usize = 5;

/// Builds the message list for one agent run.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    history_window: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl PromptBuilder {
    pub fn new(history_window: usize) -> Self {
        Self { history_window }
    }

    pub fn history_window(&self) -> usize {
        self.history_window
    }

    /// System instruction listing every tool by name and description.
    pub fn system_prompt(&self, tools: &[ToolDefinition]) -> String {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M (%A)");
        let tool_lines: Vec<String> = tools
            .iter()
            .map(|t| format!("- `{}`: {}", t.name, t.description))
            .collect();

        format!(
            r#"# VoicePC

You are VoicePC, an assistant that controls the user's desktop computer through tools.
Users usually speak Chinese; answer in the language they used.

## Current Time
{now}

## Tools
{}

Pick the tool that fits the request and call it. When a request needs several
steps, call the tools one after another. For multi-step routines such as getting
ready for work, prefer `scene_manager`.

When you are done, summarize what happened in one or two short, friendly sentences."#,
            tool_lines.join("\n")
        )
    }

    /// System prompt, the windowed history, then the current input.
    pub fn build_messages(
        &self,
        tools: &[ToolDefinition],
        history: &[HistoryEntry],
        current: &str,
    ) -> Vec<Message> {
        let start = history.len().saturating_sub(self.history_window);
        let windowed = &history[start..];

        let mut messages = Vec::with_capacity(windowed.len() + 2);
        messages.push(Message::system(self.system_prompt(tools)));
        messages.extend(windowed.iter().filter_map(|entry| match entry.role {
            Role::User => Some(Message::user(&entry.content)),
            Role::Assistant => Some(Message::assistant(&entry.content)),
            Role::System | Role::Tool => None,
        }));
        messages.push(Message::user(current));

        messages
    }
}
