pub mod middleware;
pub mod models;
pub mod models_ws;
pub mod routes;
pub mod websocket;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::chat::ChatResponder;
use crate::config::{AppConfig, ConfigError};
use crate::diagnosis::DiagnosisComposer;
use crate::feedback::FeedbackClient;
use crate::llm::ProviderFactory;
use crate::session::SessionStore;
use crate::storage::{FileStorage, LocalFileStorage};
use crate::vision::{HttpVisionDescriber, VisionDescriber};

/// Shared by every handler via `web::Data<AppState>`.
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub composer: Arc<DiagnosisComposer>,
    pub responder: Arc<ChatResponder>,
    /// Images that back chat sessions. Served under `/uploads`.
    pub uploads: Arc<dyn FileStorage>,
    /// Scratch space for one-shot diagnoses. Files are removed after use.
    pub scratch: Arc<dyn FileStorage>,
    pub feedback: Option<Arc<FeedbackClient>>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to prepare storage: {0}")]
    Storage(#[from] std::io::Error),
}

impl AppState {
    /// Wires the configured model provider, vision backend and upload directories.
    pub async fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let llm = ProviderFactory::create_default(config)?;
        let vision: Arc<dyn VisionDescriber> = Arc::new(HttpVisionDescriber::new(&config.vision));
        let store = Arc::new(SessionStore::new());

        let uploads: Arc<dyn FileStorage> =
            Arc::new(LocalFileStorage::new(&config.storage.upload_dir).await?);

        let composer = Arc::new(DiagnosisComposer::new(llm.clone(), vision.clone()));
        let responder = Arc::new(ChatResponder::new(
            store.clone(),
            llm,
            vision,
            uploads.clone(),
            config.chat.max_agent_iterations,
            config.chat.system_prompt.clone(),
        ));

        Ok(Self {
            store,
            composer,
            responder,
            uploads,
            scratch: Arc::new(LocalFileStorage::new(&config.storage.image_dir).await?),
            feedback: config.feedback.as_ref().map(|f| Arc::new(FeedbackClient::new(f))),
            max_upload_bytes: config.storage.max_upload_bytes,
        })
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = self.to_string();
        let body = match self {
            // `detail` is what form-upload clients read.
            ApiError::BadRequest(_) => json!({"success": false, "error": message, "detail": message}),
            _ => json!({"success": false, "error": message}),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
