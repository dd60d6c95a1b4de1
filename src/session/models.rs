use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// `Diagnosed` until the first follow-up succeeds, then `Conversing` for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Diagnosed,
    Conversing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub image_path: PathBuf,
    pub initial_diagnosis: String,
    pub history: Vec<Turn>,
    pub trace_ids: Vec<String>,
    pub phase: SessionPhase,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(session_id: String, image_path: PathBuf, initial_diagnosis: String) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            image_path,
            initial_diagnosis,
            history: Vec::new(),
            trace_ids: Vec::new(),
            phase: SessionPhase::Diagnosed,
            created_at: now,
            last_active: now,
        }
    }

    pub fn latest_trace_id(&self) -> Option<&str> {
        self.trace_ids.last().map(String::as_str)
    }
}
