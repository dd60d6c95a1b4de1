//! Follow-up conversation over an existing diagnosis session.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::llm::{
    models::{ChatOptions, Message},
    LlmError, LlmProvider,
};
use crate::session::{SessionError, SessionStore};
use crate::storage::FileStorage;
use crate::tools::ToolRegistry;
use crate::vision::VisionDescriber;

pub const INVALID_SESSION: &str =
    "Invalid session ID. Please start a new session by uploading a plant image.";
pub const IMAGE_UNAVAILABLE: &str =
    "Error: The previously uploaded image is no longer available. Please upload a new image.";
pub const MODEL_UNAVAILABLE: &str =
    "Sorry, I couldn't answer that right now. Please try again in a moment.";

const FINAL_ANSWER_NUDGE: &str = "You have used all available tool calls. Using only the information gathered so far, give your final answer to the user's latest question now.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Model call failed: {0}")]
    ModelCallFailure(#[from] LlmError),
}

impl From<SessionError> for ChatError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(id) => ChatError::SessionNotFound(id),
        }
    }
}

impl ChatError {
    /// The detail stays in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            ChatError::SessionNotFound(_) => INVALID_SESSION,
            ChatError::ModelCallFailure(_) => MODEL_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub content: String,
    pub trace_id: Option<String>,
    /// Model calls made, including the forced final one.
    pub calls: usize,
    /// True when the iteration cap was hit and the answer was forced.
    pub exhausted: bool,
}

pub struct ChatResponder {
    store: Arc<SessionStore>,
    llm: Arc<dyn LlmProvider>,
    vision: Arc<dyn VisionDescriber>,
    storage: Arc<dyn FileStorage>,
    max_iterations: usize,
    system_prompt: String,
}

pub fn follow_up_prompt(message: &str, initial_diagnosis: &str) -> String {
    format!(
        "The user's latest question is: {}\n\nRemember the initial plant diagnosis was: {}",
        message, initial_diagnosis
    )
}

impl ChatResponder {
    pub fn new(
        store: Arc<SessionStore>,
        llm: Arc<dyn LlmProvider>,
        vision: Arc<dyn VisionDescriber>,
        storage: Arc<dyn FileStorage>,
        max_iterations: usize,
        system_prompt: String,
    ) -> Self {
        Self {
            store,
            llm,
            vision,
            storage,
            max_iterations,
            system_prompt,
        }
    }

    /// Answers one follow-up message. Only successful exchanges reach the history.
    pub async fn respond(&self, session_id: &str, message: &str) -> Result<String, ChatError> {
        let _turn = self.store.turn_gate(session_id).await?;
        let session = self.store.get(session_id).await?;

        if !self.storage.exists(&session.image_path).await {
            warn!(session_id, image = %session.image_path.display(), "Session image is gone");
            return Ok(IMAGE_UNAVAILABLE.to_string());
        }

        let mut messages: Vec<Message> = session
            .history
            .iter()
            .map(|turn| Message {
                role: turn.role.as_str().to_string(),
                content: turn.text.clone(),
                tool_calls: None,
                tool_call_id: None,
            })
            .collect();
        messages.push(Message::user(follow_up_prompt(message, &session.initial_diagnosis)));

        let tools = ToolRegistry::for_image(
            self.vision.clone(),
            self.storage.clone(),
            session.image_path.clone(),
        );

        let outcome = self.run_agent(messages, &tools).await.map_err(|e| {
            error!(session_id, provider = self.llm.name(), error = %e, "Chat model call failed");
            ChatError::ModelCallFailure(e)
        })?;

        self.store
            .record_exchange(session_id, message, &outcome.content, outcome.trace_id.as_deref())
            .await?;

        info!(session_id, calls = outcome.calls, exhausted = outcome.exhausted, "Chat turn complete");
        Ok(outcome.content)
    }

    /// Tool-using loop capped at `max_iterations` model calls, plus one forced
    /// answer without tools if the cap is reached.
    pub async fn run_agent(
        &self,
        mut messages: Vec<Message>,
        tools: &ToolRegistry,
    ) -> Result<AgentOutcome, LlmError> {
        let definitions = tools.get_definitions();
        let mut trace_id = None;

        for iteration in 1..=self.max_iterations {
            let options = ChatOptions {
                system_prompt: Some(self.system_prompt.clone()),
                tools: Some(definitions.clone()),
                ..Default::default()
            };
            let response = self.llm.chat(&messages, options).await?;
            if response.trace_id.is_some() {
                trace_id = response.trace_id.clone();
            }

            let calls = match response.tool_calls {
                Some(calls) if !calls.is_empty() => calls,
                _ => {
                    debug!(iteration, "Agent answered");
                    return Ok(AgentOutcome {
                        content: response.content,
                        trace_id,
                        calls: iteration,
                        exhausted: false,
                    });
                }
            };

            let mut assistant = Message::assistant(response.content);
            assistant.tool_calls = Some(calls.clone());
            messages.push(assistant);

            for call in calls {
                debug!(iteration, tool = %call.function.name, "Agent called tool");
                let output = tools.call_tool(&call.function.name, &call.function.arguments).await;
                messages.push(Message::tool_result(call.id, output));
            }
        }

        warn!(max_iterations = self.max_iterations, "Agent hit iteration limit, forcing final answer");
        messages.push(Message::user(FINAL_ANSWER_NUDGE));
        let options = ChatOptions {
            system_prompt: Some(self.system_prompt.clone()),
            ..Default::default()
        };
        let response = self.llm.chat(&messages, options).await?;

        Ok(AgentOutcome {
            content: response.content,
            trace_id: response.trace_id.or(trace_id),
            calls: self.max_iterations + 1,
            exhausted: true,
        })
    }
}
