use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::session::models::{Role, Session, SessionPhase, Turn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
}

struct SessionEntry {
    /// Held by a chat turn for its whole read-model-write cycle.
    gate: Arc<Mutex<()>>,
    state: RwLock<Session>,
}

/// Process-lifetime session map. Nothing is persisted.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, session_id: &str) -> Result<Arc<SessionEntry>, SessionError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Always mints a new id, even for an image path seen before.
    pub async fn create_session(&self, image_path: PathBuf, initial_diagnosis: String) -> String {
        self.create_seeded_session(image_path, initial_diagnosis, Vec::new(), None)
            .await
    }

    /// Registers a session that already carries its opening turns, so readers
    /// never observe it half-seeded.
    pub async fn create_seeded_session(
        &self,
        image_path: PathBuf,
        initial_diagnosis: String,
        history: Vec<Turn>,
        trace_id: Option<String>,
    ) -> String {
        let session_id = Uuid::new_v4().to_string();
        let mut session = Session::new(session_id.clone(), image_path, initial_diagnosis);
        session.history = history;
        session.trace_ids.extend(trace_id);

        let entry = Arc::new(SessionEntry {
            gate: Arc::new(Mutex::new(())),
            state: RwLock::new(session),
        });
        self.sessions.write().await.insert(session_id.clone(), entry);
        debug!(session_id = %session_id, "Session registered");
        session_id
    }

    pub async fn get(&self, session_id: &str) -> Result<Session, SessionError> {
        let entry = self.entry(session_id).await?;
        let session = entry.state.read().await.clone();
        Ok(session)
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn append_turn(&self, session_id: &str, role: Role, text: &str) -> Result<(), SessionError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.state.write().await;
        session.history.push(Turn {
            role,
            text: text.to_string(),
        });
        session.last_active = Utc::now();
        Ok(())
    }

    pub async fn append_trace(&self, session_id: &str, trace_id: &str) -> Result<(), SessionError> {
        let entry = self.entry(session_id).await?;
        entry.state.write().await.trace_ids.push(trace_id.to_string());
        Ok(())
    }

    /// Appends a completed user/assistant exchange in a single write.
    pub async fn record_exchange(
        &self,
        session_id: &str,
        user_text: &str,
        assistant_text: &str,
        trace_id: Option<&str>,
    ) -> Result<(), SessionError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.state.write().await;
        session.history.push(Turn {
            role: Role::User,
            text: user_text.to_string(),
        });
        session.history.push(Turn {
            role: Role::Assistant,
            text: assistant_text.to_string(),
        });
        if let Some(trace_id) = trace_id {
            session.trace_ids.push(trace_id.to_string());
        }
        session.phase = SessionPhase::Conversing;
        session.last_active = Utc::now();
        Ok(())
    }

    /// Serializes chat turns for one session. Waiters are served in arrival order.
    pub async fn turn_gate(&self, session_id: &str) -> Result<OwnedMutexGuard<()>, SessionError> {
        let entry = self.entry(session_id).await?;
        Ok(entry.gate.clone().lock_owned().await)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops sessions idle longer than `max_idle`. Sessions mid-turn are kept.
    pub async fn purge_idle(&self, max_idle: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_idle)
            .ok()
            .and_then(|d| Utc::now().checked_sub_signed(d))
        else {
            return 0;
        };

        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();
        for (id, entry) in sessions.iter() {
            if entry.gate.try_lock().is_err() {
                continue;
            }
            if entry.state.read().await.last_active < cutoff {
                expired.push(id.clone());
            }
        }

        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Purged idle sessions");
        }
        expired.len()
    }
}
