//! Session persistence - where conversation history and memory live between runs

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::agent::Role;
use crate::error::Error;
use crate::Result;

/// One stored conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Session persistence trait - durable storage behind the context store
pub trait SessionPersistence: Send + Sync {
    /// Full message log, oldest first
    fn load_history(&self, session_id: &str) -> Result<Vec<HistoryEntry>>;

    /// Append one message to the log
    fn append_message(&self, session_id: &str, entry: &HistoryEntry) -> Result<()>;

    /// Session memory map
    fn load_memory(&self, session_id: &str) -> Result<HashMap<String, String>>;

    /// Replace the session memory map
    fn save_memory(&self, session_id: &str, memory: &HashMap<String, String>) -> Result<()>;
}

/// File-based persistence: `<root>/<session>/messages.jsonl` and `memory.json`
pub struct FilePersistence {
    root: PathBuf,
}

impl FilePersistence {
    /// Store sessions under `<workspace>/sessions`.
    pub fn new(workspace: &Path) -> Self {
        Self {
            root: workspace.join("sessions"),
        }
    }

    /// Session ids come from users; percent-encode them into a single path
    /// component so that distinct ids never share a directory.
    fn session_dir(&self, session_id: &str) -> PathBuf {
        let encoded: String = url::form_urlencoded::byte_serialize(session_id.as_bytes()).collect();
        // `.` and `*` survive form encoding; neither is safe as a directory name everywhere.
        let safe = encoded.replace('.', "%2E").replace('*', "%2A");
        self.root.join(safe)
    }

    fn messages_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("messages.jsonl")
    }

    fn memory_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("memory.json")
    }
}

impl SessionPersistence for FilePersistence {
    fn load_history(&self, session_id: &str) -> Result<Vec<HistoryEntry>> {
        let path = self.messages_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&path)?;
        let entries = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping malformed history line");
                    None
                }
            })
            .collect();
        Ok(entries)
    }

    fn append_message(&self, session_id: &str, entry: &HistoryEntry) -> Result<()> {
        let path = self.messages_path(session_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes()).map_err(Error::from)
    }

    fn load_memory(&self, session_id: &str) -> Result<HashMap<String, String>> {
        let path = self.memory_path(session_id);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save_memory(&self, session_id: &str, memory: &HashMap<String, String>) -> Result<()> {
        let path = self.memory_path(session_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(memory)?)?;
        Ok(())
    }
}

/// Keeps nothing; sessions live only as long as the process
pub struct NoPersistence;

impl SessionPersistence for NoPersistence {
    fn load_history(&self, _session_id: &str) -> Result<Vec<HistoryEntry>> {
        Ok(Vec::new())
    }

    fn append_message(&self, _session_id: &str, _entry: &HistoryEntry) -> Result<()> {
        Ok(())
    }

    fn load_memory(&self, _session_id: &str) -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    fn save_memory(&self, _session_id: &str, _memory: &HashMap<String, String>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_persistence_history() {
        let tmp = TempDir::new().unwrap();
        let store = FilePersistence::new(tmp.path());

        let first = HistoryEntry::new(Role::User, "打开微信");
        let second = HistoryEntry::new(Role::Assistant, "Opened 微信");
        store.append_message("s1", &first).unwrap();
        store.append_message("s1", &second).unwrap();

        assert_eq!(store.load_history("s1").unwrap(), vec![first, second]);
        assert!(store.load_history("other").unwrap().is_empty());
    }

    #[test]
    fn test_file_persistence_memory() {
        let tmp = TempDir::new().unwrap();
        let store = FilePersistence::new(tmp.path());

        let memory = HashMap::from([("last_entity".to_string(), "微信".to_string())]);
        store.save_memory("s1", &memory).unwrap();
        assert_eq!(store.load_memory("s1").unwrap(), memory);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let tmp = TempDir::new().unwrap();
        let store = FilePersistence::new(tmp.path());
        store.append_message("s1", &HistoryEntry::new(Role::User, "hi")).unwrap();

        let path = store.messages_path("s1");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{not json\n");
        std::fs::write(&path, content).unwrap();

        assert_eq!(store.load_history("s1").unwrap().len(), 1);
    }

    #[test]
    fn test_session_id_stays_inside_root() {
        let tmp = TempDir::new().unwrap();
        let store = FilePersistence::new(tmp.path());
        let dir = store.session_dir("../../etc");
        assert!(dir.starts_with(tmp.path().join("sessions")));
        assert_eq!(dir.file_name().unwrap(), "%2E%2E%2F%2E%2E%2Fetc");
        assert_eq!(store.session_dir("..").file_name().unwrap(), "%2E%2E");
    }

    #[test]
    fn test_similar_session_ids_stay_separate() {
        let tmp = TempDir::new().unwrap();
        let store = FilePersistence::new(tmp.path());

        store.append_message("cli:default", &HistoryEntry::new(Role::User, "secret of A")).unwrap();
        store
            .save_memory("cli:default", &HashMap::from([("last_entity".to_string(), "微信".to_string())]))
            .unwrap();

        assert_ne!(store.session_dir("cli:default"), store.session_dir("cli_default"));
        assert!(store.load_history("cli_default").unwrap().is_empty());
        assert!(store.load_memory("cli_default").unwrap().is_empty());
        assert_eq!(store.load_history("cli:default").unwrap().len(), 1);
    }
}
