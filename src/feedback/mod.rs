use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::FeedbackConfig;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Feedback API error: {0}")]
    Api(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(default = "default_key")]
    pub key: String,
    pub score: Option<f64>,
    #[serde(default)]
    pub comment: String,
    pub value: Option<serde_json::Value>,
}

fn default_key() -> String {
    "user_rating".to_string()
}

/// Posts ratings to an observability API against a recorded trace id.
pub struct FeedbackClient {
    client: Client,
    api_base: String,
    api_key: String,
}

impl FeedbackClient {
    pub fn new(config: &FeedbackConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    pub async fn submit(&self, run_id: &str, feedback: &Feedback) -> Result<(), FeedbackError> {
        let body = json!({
            "run_id": run_id,
            "key": feedback.key,
            "score": feedback.score,
            "comment": feedback.comment,
            "value": feedback.value,
        });

        let response = self
            .client
            .post(format!("{}/feedback", self.api_base))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(run_id, %status, "Feedback rejected");
            return Err(FeedbackError::Api(format!("{}: {}", status, text)));
        }

        info!(run_id, key = %feedback.key, "Feedback recorded");
        Ok(())
    }
}
