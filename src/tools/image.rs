use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::llm::models::{FunctionDefinition, ToolDefinition};
use crate::storage::FileStorage;
use crate::tools::Tool;
use crate::vision::{render_detections, VisionDescriber};

fn missing_image(image_path: &Path) -> String {
    format!("Error: Image file not found at path: {}", image_path.display())
}

// The model may pass an `image_path`, but the tools only ever read the
// session's own upload.
fn image_parameters() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "image_path": {
                "type": "string",
                "description": "Path of the uploaded plant image. Optional; defaults to the current session's image."
            }
        },
        "required": []
    })
}

pub struct ImageCaptionTool {
    vision: Arc<dyn VisionDescriber>,
    storage: Arc<dyn FileStorage>,
    image_path: PathBuf,
}

impl ImageCaptionTool {
    pub fn new(vision: Arc<dyn VisionDescriber>, storage: Arc<dyn FileStorage>, image_path: PathBuf) -> Self {
        Self {
            vision,
            storage,
            image_path,
        }
    }
}

#[async_trait]
impl Tool for ImageCaptionTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: "image_captioner".to_string(),
                description: "Use this tool when you would like the uploaded plant image to be described."
                    .to_string(),
                parameters: image_parameters(),
            },
        }
    }

    async fn call(&self, _arguments: &str) -> String {
        if !self.storage.exists(&self.image_path).await {
            return missing_image(&self.image_path);
        }
        info!(image = %self.image_path.display(), "Captioning image");
        match self.vision.caption(&self.image_path).await {
            Ok(caption) => caption,
            Err(e) => format!("Error processing image: {}", e),
        }
    }
}

pub struct ObjectDetectionTool {
    vision: Arc<dyn VisionDescriber>,
    storage: Arc<dyn FileStorage>,
    image_path: PathBuf,
}

impl ObjectDetectionTool {
    pub fn new(vision: Arc<dyn VisionDescriber>, storage: Arc<dyn FileStorage>, image_path: PathBuf) -> Self {
        Self {
            vision,
            storage,
            image_path,
        }
    }
}

#[async_trait]
impl Tool for ObjectDetectionTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: "object_detector".to_string(),
                description: "Use this tool to detect objects in the uploaded plant image. \
                    It returns one detection per line in the format: [x1, y1, x2, y2] class_name confidence_score."
                    .to_string(),
                parameters: image_parameters(),
            },
        }
    }

    async fn call(&self, _arguments: &str) -> String {
        if !self.storage.exists(&self.image_path).await {
            return missing_image(&self.image_path);
        }
        info!(image = %self.image_path.display(), "Detecting objects");
        match self.vision.detect(&self.image_path).await {
            Ok(detections) if detections.is_empty() => "No objects detected.".to_string(),
            Ok(detections) => render_detections(&detections),
            Err(e) => format!("Error detecting objects: {}", e),
        }
    }
}
