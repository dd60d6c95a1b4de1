//! Image description: a caption plus the objects a detector is confident about.

pub mod huggingface;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

pub use huggingface::HttpVisionDescriber;

/// Stands in for a caption the backend could not produce.
pub const UNAVAILABLE: &str = "unavailable";

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Image could not be decoded: {0}")]
    ImageUnreadable(String),
    #[error("Vision backend error: {0}")]
    Backend(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub bounding_box: (i32, i32, i32, i32),
    pub label: String,
    pub confidence: f32,
}

impl DetectedObject {
    /// `[x1, y1, x2, y2] label confidence`
    pub fn render(&self) -> String {
        let (x1, y1, x2, y2) = self.bounding_box;
        format!("[{}, {}, {}, {}] {} {}", x1, y1, x2, y2, self.label, self.confidence)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisionDescription {
    pub caption: String,
    pub detections: Vec<DetectedObject>,
}

impl VisionDescription {
    pub fn detection_summary(&self) -> String {
        render_detections(&self.detections)
    }
}

pub fn render_detections(detections: &[DetectedObject]) -> String {
    detections
        .iter()
        .map(DetectedObject::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads and decodes the file so corrupt or non-image uploads fail before any model call.
pub async fn check_image(image_path: &Path) -> Result<(), VisionError> {
    let bytes = tokio::fs::read(image_path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            VisionError::ImageUnreadable(format!("image not found at {}", image_path.display()))
        } else {
            VisionError::Io(e)
        }
    })?;

    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes).map(|_| ()))
        .await
        .map_err(|e| VisionError::Backend(format!("decode task failed: {}", e)))?
        .map_err(|e| VisionError::ImageUnreadable(e.to_string()))
}

#[async_trait]
pub trait VisionDescriber: Send + Sync {
    async fn caption(&self, image_path: &Path) -> Result<String, VisionError>;

    /// Detections above the confidence threshold, in the backend's order.
    async fn detect(&self, image_path: &Path) -> Result<Vec<DetectedObject>, VisionError>;

    /// Fails only when the image is unreadable or both backends are down; a
    /// single failing backend leaves the other half of the description intact.
    async fn describe(&self, image_path: &Path) -> Result<VisionDescription, VisionError> {
        check_image(image_path).await?;
        let (caption, detections) =
            tokio::join!(self.caption(image_path), self.detect(image_path));

        match (caption, detections) {
            (Err(caption_err), Err(detect_err)) => {
                warn!(error = %detect_err, "Object detection failed");
                Err(caption_err)
            }
            (caption, detections) => Ok(VisionDescription {
                caption: caption.unwrap_or_else(|e| {
                    warn!(error = %e, "Captioning failed");
                    UNAVAILABLE.to_string()
                }),
                detections: detections.unwrap_or_else(|e| {
                    warn!(error = %e, "Object detection failed");
                    Vec::new()
                }),
            }),
        }
    }
}
