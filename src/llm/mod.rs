pub mod anthropic;
pub mod models;
pub mod ollama;
pub mod openai;

use anthropic::AnthropicProvider;
use ollama::OllamaProvider;
use openai::OpenAiProvider;

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{AppConfig, ConfigError};
use models::{ChatOptions, ChatResponse, Message};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Network Error: {0}")]
    Network(String),
    #[error("API Error: {0}")]
    Api(String),
    #[error("Invalid Response: {0}")]
    InvalidResponse(String),
    #[error("Rate Limited")]
    RateLimited,
    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(e.to_string())
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError>;

    fn supported_models(&self) -> Vec<&str>;
}

pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Builds the configured provider. Credentials were checked by `AppConfig::validate`.
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_default(config: &AppConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
        let timeout = Duration::from_secs(config.llm.request_timeout_secs);
        let provider_name = config.llm.provider.as_str();

        match provider_name {
            "openai" => {
                let cfg = config.llm.openai.as_ref().ok_or_else(|| {
                    ConfigError::MissingCredential("llm.openai".to_string())
                })?;
                Ok(Arc::new(OpenAiProvider::new(
                    cfg.api_key.clone(),
                    cfg.api_base.clone(),
                    cfg.default_model.clone(),
                    timeout,
                )))
            }
            "anthropic" => {
                let cfg = config.llm.anthropic.as_ref().ok_or_else(|| {
                    ConfigError::MissingCredential("llm.anthropic".to_string())
                })?;
                Ok(Arc::new(AnthropicProvider::new(
                    cfg.api_key.clone(),
                    cfg.api_base.clone(),
                    cfg.default_model.clone(),
                    timeout,
                )))
            }
            "ollama" => {
                let cfg = config.llm.ollama.as_ref().ok_or_else(|| {
                    ConfigError::MissingCredential("llm.ollama".to_string())
                })?;
                Ok(Arc::new(OllamaProvider::new(
                    cfg.base_url.clone(),
                    cfg.default_model.clone(),
                    timeout,
                )))
            }
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}
