//! Session module - per-session conversation history and memory
//!
//! The [`ContextStore`] keeps every session in memory behind its own lock and
//! writes through to a [`SessionPersistence`]. History is append-only; reads
//! return a window of the most recent entries.

mod persist;
mod resolve;

pub use persist::{FilePersistence, HistoryEntry, NoPersistence, SessionPersistence};
pub use resolve::{resolve_reference, LAST_ENTITY_KEY};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::agent::Role;
use crate::error::Error;
use crate::Result;

#[derive(Debug, Default)]
struct SessionState {
    history: Vec<HistoryEntry>,
    memory: HashMap<String, String>,
}

/// Store of all sessions seen by this process
pub struct ContextStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionState>>>>,
    persistence: Arc<dyn SessionPersistence>,
}

impl ContextStore {
    pub fn new(persistence: Arc<dyn SessionPersistence>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            persistence,
        }
    }

    /// Store that forgets everything on exit.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(NoPersistence))
    }

    /// Get or create the session, hydrating a new one from persistence.
    async fn session(&self, session_id: &str) -> Result<Arc<Mutex<SessionState>>> {
        if session_id.trim().is_empty() {
            return Err(Error::Validation("Session id must not be empty".to_string()));
        }

        if let Some(state) = self.sessions.read().await.get(session_id) {
            return Ok(state.clone());
        }

        let mut sessions = self.sessions.write().await;
        if let Some(state) = sessions.get(session_id) {
            return Ok(state.clone());
        }

        let state = Arc::new(Mutex::new(self.hydrate(session_id).await));
        sessions.insert(session_id.to_string(), state.clone());
        Ok(state)
    }

    async fn hydrate(&self, session_id: &str) -> SessionState {
        let persistence = self.persistence.clone();
        let id = session_id.to_string();
        let loaded = tokio::task::spawn_blocking(move || {
            (persistence.load_history(&id), persistence.load_memory(&id))
        })
        .await;

        let (history, memory) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                let err = || Error::Session(format!("Persistence task failed: {e}"));
                (Err(err()), Err(err()))
            }
        };

        let history = history.unwrap_or_else(|e| {
            warn!(session = %session_id, error = %e, "Failed to load session history");
            Vec::new()
        });
        let memory = memory.unwrap_or_else(|e| {
            warn!(session = %session_id, error = %e, "Failed to load session memory");
            HashMap::new()
        });

        info!(session = %session_id, messages = history.len(), "Session created");
        SessionState { history, memory }
    }

    /// Run a persistence write off the async runtime.
    async fn persist<F>(&self, write: F) -> Result<()>
    where
        F: FnOnce(&dyn SessionPersistence) -> Result<()> + Send + 'static,
    {
        let persistence = self.persistence.clone();
        tokio::task::spawn_blocking(move || write(persistence.as_ref()))
            .await
            .map_err(|e| Error::Session(format!("Persistence task failed: {e}")))?
    }

    /// Create the session if it does not exist yet. Idempotent.
    pub async fn create(&self, session_id: &str) -> Result<()> {
        self.session(session_id).await.map(|_| ())
    }

    /// Append a user or assistant message.
    ///
    /// Other roles and blank content are rejected and nothing is stored.
    pub async fn append_message(&self, session_id: &str, role: Role, content: &str) -> Result<HistoryEntry> {
        if !matches!(role, Role::User | Role::Assistant) {
            return Err(Error::Validation(format!(
                "Invalid message role: {}",
                role.as_str()
            )));
        }
        if content.trim().is_empty() {
            return Err(Error::Validation("Message content must not be empty".to_string()));
        }

        let state = self.session(session_id).await?;
        let mut state = state.lock().await;

        let entry = HistoryEntry::new(role, content);
        let (id, stored) = (session_id.to_string(), entry.clone());
        // Written under the session lock so the log keeps append order.
        if let Err(e) = self.persist(move |p| p.append_message(&id, &stored)).await {
            warn!(session = %session_id, error = %e, "Failed to persist message");
        }
        state.history.push(entry.clone());
        debug!(session = %session_id, role = role.as_str(), "Message appended");

        Ok(entry)
    }

    /// The last `limit` messages, oldest first.
    pub async fn recent_history(&self, session_id: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let state = self.session(session_id).await?;
        let state = state.lock().await;

        let start = state.history.len().saturating_sub(limit);
        Ok(state.history[start..].to_vec())
    }

    pub async fn get_memory(&self, session_id: &str) -> Result<HashMap<String, String>> {
        let state = self.session(session_id).await?;
        let memory = state.lock().await.memory.clone();
        Ok(memory)
    }

    pub async fn set_memory(&self, session_id: &str, key: &str, value: &str) -> Result<()> {
        let state = self.session(session_id).await?;
        let mut state = state.lock().await;

        state.memory.insert(key.to_string(), value.to_string());
        let (id, memory) = (session_id.to_string(), state.memory.clone());
        if let Err(e) = self.persist(move |p| p.save_memory(&id, &memory)).await {
            warn!(session = %session_id, error = %e, "Failed to persist session memory");
        }
        Ok(())
    }

    /// Number of sessions loaded in this process.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Persistence whose writes always fail.
    struct BrokenPersistence;

    impl SessionPersistence for BrokenPersistence {
        fn load_history(&self, _: &str) -> Result<Vec<HistoryEntry>> {
            Err(Error::Session("disk gone".to_string()))
        }
        fn append_message(&self, _: &str, _: &HistoryEntry) -> Result<()> {
            Err(Error::Session("disk gone".to_string()))
        }
        fn load_memory(&self, _: &str) -> Result<HashMap<String, String>> {
            Err(Error::Session("disk gone".to_string()))
        }
        fn save_memory(&self, _: &str, _: &HashMap<String, String>) -> Result<()> {
            Err(Error::Session("disk gone".to_string()))
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let store = ContextStore::in_memory();
        store.create("s1").await.unwrap();
        store.append_message("s1", Role::User, "hi").await.unwrap();
        store.create("s1").await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.recent_history("s1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recent_history_window_oldest_first() {
        let store = ContextStore::in_memory();
        for i in 0..7 {
            store.append_message("s1", Role::User, &format!("m{i}")).await.unwrap();
        }

        let recent = store.recent_history("s1", 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m5", "m6"]);

        assert_eq!(store.recent_history("s1", 100).await.unwrap().len(), 7);
        assert!(store.recent_history("s1", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_messages_rejected() {
        let store = ContextStore::in_memory();

        let blank = store.append_message("s1", Role::User, "   ").await;
        assert!(matches!(blank, Err(Error::Validation(_))));

        let system = store.append_message("s1", Role::System, "you are a bot").await;
        assert!(matches!(system, Err(Error::Validation(_))));

        assert!(store.recent_history("s1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_session_id_rejected() {
        let store = ContextStore::in_memory();
        assert!(store.create(" ").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_per_session() {
        let store = ContextStore::in_memory();
        store.set_memory("s1", LAST_ENTITY_KEY, "微信").await.unwrap();

        assert_eq!(store.get_memory("s1").await.unwrap()[LAST_ENTITY_KEY], "微信");
        assert!(store.get_memory("s2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hydrates_from_files() {
        let tmp = TempDir::new().unwrap();
        {
            let store = ContextStore::new(Arc::new(FilePersistence::new(tmp.path())));
            store.append_message("s1", Role::User, "打开微信").await.unwrap();
            store.append_message("s1", Role::Assistant, "Opened 微信").await.unwrap();
            store.set_memory("s1", LAST_ENTITY_KEY, "微信").await.unwrap();
        }

        let store = ContextStore::new(Arc::new(FilePersistence::new(tmp.path())));
        let history = store.recent_history("s1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(store.get_memory("s1").await.unwrap()[LAST_ENTITY_KEY], "微信");
    }

    #[tokio::test]
    async fn test_persistence_failures_do_not_fail_operations() {
        let store = ContextStore::new(Arc::new(BrokenPersistence));
        store.append_message("s1", Role::User, "hi").await.unwrap();
        store.set_memory("s1", "k", "v").await.unwrap();

        assert_eq!(store.recent_history("s1", 5).await.unwrap().len(), 1);
        assert_eq!(store.get_memory("s1").await.unwrap()["k"], "v");
    }
}
