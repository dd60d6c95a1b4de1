use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::config::VisionConfig;
use crate::vision::{DetectedObject, VisionDescriber, VisionError};

/// Talks to hosted inference endpoints that take raw image bytes, one model per URL.
pub struct HttpVisionDescriber {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    caption_model: String,
    detection_model: String,
    confidence_threshold: f32,
}

#[derive(Debug, Deserialize)]
struct CaptionOutput {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
struct DetectionBox {
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
}

#[derive(Debug, Deserialize)]
struct DetectionOutput {
    score: f32,
    label: String,
    #[serde(rename = "box")]
    bbox: DetectionBox,
}

impl HttpVisionDescriber {
    pub fn new(config: &VisionConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone().filter(|t| !t.is_empty()),
            caption_model: config.caption_model.clone(),
            detection_model: config.detection_model.clone(),
            confidence_threshold: config.confidence_threshold,
        }
    }

    async fn infer(&self, model: &str, image_path: &Path) -> Result<serde_json::Value, VisionError> {
        let bytes = tokio::fs::read(image_path).await?;

        let mut request = self
            .client
            .post(format!("{}/{}", self.base_url, model))
            .header("Content-Type", "application/octet-stream")
            .body(bytes);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VisionError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(VisionError::Backend(format!("{} returned {}: {}", model, status, text)));
        }

        response
            .json()
            .await
            .map_err(|e| VisionError::Backend(e.to_string()))
    }
}

#[async_trait]
impl VisionDescriber for HttpVisionDescriber {
    async fn caption(&self, image_path: &Path) -> Result<String, VisionError> {
        let value = self.infer(&self.caption_model, image_path).await?;
        let outputs: Vec<CaptionOutput> = serde_json::from_value(value)
            .map_err(|e| VisionError::Backend(format!("unexpected caption payload: {}", e)))?;

        let caption = outputs
            .into_iter()
            .next()
            .map(|o| o.generated_text.trim().to_string())
            .unwrap_or_default();
        debug!(caption = %caption, "Image captioned");
        Ok(caption)
    }

    async fn detect(&self, image_path: &Path) -> Result<Vec<DetectedObject>, VisionError> {
        let value = self.infer(&self.detection_model, image_path).await?;
        let outputs: Vec<DetectionOutput> = serde_json::from_value(value)
            .map_err(|e| VisionError::Backend(format!("unexpected detection payload: {}", e)))?;

        let detections: Vec<DetectedObject> = outputs
            .into_iter()
            .filter(|o| o.score > self.confidence_threshold)
            .map(|o| DetectedObject {
                bounding_box: (
                    o.bbox.xmin as i32,
                    o.bbox.ymin as i32,
                    o.bbox.xmax as i32,
                    o.bbox.ymax as i32,
                ),
                label: o.label,
                confidence: o.score,
            })
            .collect();
        debug!(count = detections.len(), "Objects detected");
        Ok(detections)
    }
}
