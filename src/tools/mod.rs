pub mod image;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::llm::models::ToolDefinition;
use crate::storage::FileStorage;
use crate::vision::VisionDescriber;

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    /// Failures come back as text for the model to read.
    async fn call(&self, arguments: &str) -> String;
}

pub struct ToolRegistry {
    pub tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Box<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// The captioner and detector, both pinned to one session's image.
    pub fn for_image(
        vision: Arc<dyn VisionDescriber>,
        storage: Arc<dyn FileStorage>,
        image_path: PathBuf,
    ) -> Self {
        Self::new(vec![
            Box::new(image::ImageCaptionTool::new(
                vision.clone(),
                storage.clone(),
                image_path.clone(),
            )),
            Box::new(image::ObjectDetectionTool::new(vision, storage, image_path)),
        ])
    }

    pub fn get_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub async fn call_tool(&self, name: &str, arguments: &str) -> String {
        for tool in &self.tools {
            if tool.definition().function.name == name {
                return tool.call(arguments).await;
            }
        }
        format!("Error: Tool '{}' not found", name)
    }
}
