//! Assistant - one user turn, end to end
//!
//! A turn records the user's message, resolves pronouns against session
//! memory, runs the agent, records the reply, and remembers the last
//! application acted on so a follow-up like "关闭它" works.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::agent::{AgentLoop, AgentMode, AgentStep, Role};
use crate::session::{resolve_reference, ContextStore, LAST_ENTITY_KEY};
use crate::Result;

/// Reply recorded when the agent produced no text.
const EMPTY_REPLY: &str = "Done";

/// Result of one turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub session_id: String,
    pub reply: String,
    pub steps: Vec<AgentStep>,
    pub success: bool,
}

/// Ties the session store and the agent together
pub struct Assistant {
    agent: AgentLoop,
    sessions: Arc<ContextStore>,
    history_window: usize,
    // Turns within a session run one at a time.
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Assistant {
    pub fn new(agent: AgentLoop, sessions: Arc<ContextStore>, history_window: usize) -> Self {
        Self {
            agent,
            sessions,
            history_window,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> AgentMode {
        self.agent.mode()
    }

    pub fn sessions(&self) -> &Arc<ContextStore> {
        &self.sessions
    }

    /// Handle one user message in `session_id`.
    ///
    /// Fails only on invalid input (blank text, blank session id); tool and
    /// model problems are reported inside the outcome.
    pub async fn handle(&self, session_id: &str, text: &str) -> Result<TurnOutcome> {
        let lock = {
            let mut locks = self.turn_locks.lock().await;
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let outcome = {
            let _guard = lock.lock().await;
            self.run_turn(session_id, text).await
        };

        self.release_turn_lock(session_id, lock).await;
        outcome
    }

    /// Drop the session's lock entry once no other turn holds or awaits it.
    async fn release_turn_lock(&self, session_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.turn_locks.lock().await;
        // Only the map and `lock` itself remain.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(session_id);
        }
    }

    async fn run_turn(&self, session_id: &str, text: &str) -> Result<TurnOutcome> {
        self.sessions.create(session_id).await?;
        let memory = self.sessions.get_memory(session_id).await?;
        let history = self.sessions.recent_history(session_id, self.history_window).await?;

        self.sessions.append_message(session_id, Role::User, text).await?;

        let resolved = resolve_reference(text, &memory);
        if resolved != text {
            debug!(session = %session_id, original = %text, resolved = %resolved, "Resolved reference");
        }

        let output = self.agent.run(&resolved, &history).await;

        let reply = if output.output.trim().is_empty() {
            EMPTY_REPLY.to_string()
        } else {
            output.output
        };
        self.sessions.append_message(session_id, Role::Assistant, &reply).await?;

        let last_entity = output
            .intermediate_steps
            .iter()
            .filter_map(|step| step.tool_input.get("app_name").and_then(|v| v.as_str()))
            .filter(|name| !name.trim().is_empty())
            .last();
        if let Some(entity) = last_entity {
            self.sessions.set_memory(session_id, LAST_ENTITY_KEY, entity).await?;
        }

        info!(
            session = %session_id,
            steps = output.intermediate_steps.len(),
            success = output.success,
            "Turn completed"
        );

        Ok(TurnOutcome {
            session_id: session_id.to_string(),
            reply,
            steps: output.intermediate_steps,
            success: output.success,
        })
    }
}
