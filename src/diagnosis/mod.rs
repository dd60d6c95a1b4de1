pub mod extract;
pub mod result;

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::llm::{
    models::{ChatOptions, Message},
    LlmError, LlmProvider,
};
use crate::session::{Role, SessionStore, Turn};
use crate::vision::{VisionDescriber, VisionDescription, VisionError, UNAVAILABLE};

pub use extract::extract;
pub use result::{DiagnosisResult, Findings};

/// Used when the user gives no symptoms so the model always has something to weigh.
pub const DEFAULT_SYMPTOMS: &str = "1. Wet-looking, dark patches appear on leaves, usually starting from the edges.\n\
2. A white, cotton-like layer may grow on the underside of leaves when it's humid.";

#[derive(Debug, Error)]
pub enum DiagnosisError {
    #[error("{0}")]
    ImageUnreadable(String),
    #[error("Model call failed: {0}")]
    ModelCall(#[from] LlmError),
}

impl DiagnosisError {
    pub fn user_message(&self) -> String {
        match self {
            DiagnosisError::ImageUnreadable(detail) => format!(
                "Error loading image: {}. Please ensure the file is a valid image.",
                detail
            ),
            DiagnosisError::ModelCall(_) => {
                "Sorry, the diagnosis service is unavailable right now. Please try again shortly."
                    .to_string()
            }
        }
    }
}

/// Everything one analysis pass produced.
#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub result: DiagnosisResult,
    pub symptoms: String,
    /// The model's reply before extraction.
    pub model_text: String,
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionStart {
    pub session_id: String,
    pub response: String,
    pub result: DiagnosisResult,
}

pub struct DiagnosisComposer {
    llm: Arc<dyn LlmProvider>,
    vision: Arc<dyn VisionDescriber>,
}

pub fn build_prompt(description: &VisionDescription, symptoms: &str) -> String {
    format!(
        r#"You are a plant disease diagnosis expert. Analyze the following information about a plant image:

IMAGE CAPTION: {caption}

OBJECT DETECTION:
{detections}

DISEASE SYMPTOMS:
{symptoms}

Based on this information, provide your diagnosis in this exact JSON format:
{{
    "possible_diagnosis": ["Diagnosis 1", "Diagnosis 2"],
    "causes": ["Cause 1", "Cause 2"],
    "remedies_or_cure": ["Remedy 1", "Remedy 2"]
}}

Return only the valid JSON with no additional text or formatting."#,
        caption = description.caption,
        detections = description.detection_summary(),
        symptoms = symptoms,
    )
}

impl DiagnosisComposer {
    pub fn new(llm: Arc<dyn LlmProvider>, vision: Arc<dyn VisionDescriber>) -> Self {
        Self { llm, vision }
    }

    /// Runs vision, prompts the model once and extracts the findings.
    pub async fn analyze(
        &self,
        image_path: &Path,
        symptoms: Option<&str>,
    ) -> Result<Diagnosis, DiagnosisError> {
        let symptoms = symptoms
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SYMPTOMS)
            .to_string();

        let description = match self.vision.describe(image_path).await {
            Ok(description) => description,
            Err(VisionError::ImageUnreadable(detail)) => {
                return Err(DiagnosisError::ImageUnreadable(detail));
            }
            Err(e) => {
                // The model can still work from the symptoms alone.
                warn!(error = %e, "Vision backend unavailable, diagnosing from symptoms only");
                VisionDescription {
                    caption: UNAVAILABLE.to_string(),
                    detections: Vec::new(),
                }
            }
        };

        let prompt = build_prompt(&description, &symptoms);
        let options = ChatOptions {
            temperature: Some(0.2),
            max_tokens: Some(1024),
            ..Default::default()
        };

        let response = self
            .llm
            .chat(&[Message::user(prompt)], options)
            .await
            .map_err(|e| {
                error!(provider = self.llm.name(), error = %e, "Diagnosis model call failed");
                DiagnosisError::ModelCall(e)
            })?;

        let result = extract(&response.content).with_image_path(image_path.display().to_string());

        Ok(Diagnosis {
            result,
            symptoms,
            model_text: response.content,
            trace_id: response.trace_id,
        })
    }

    /// Never fails: any error is folded into `success=false`.
    pub async fn diagnose(&self, image_path: &Path, symptoms: Option<&str>) -> DiagnosisResult {
        match self.analyze(image_path, symptoms).await {
            Ok(diagnosis) => diagnosis.result,
            Err(e) => DiagnosisResult::failure(e.to_string())
                .with_image_path(image_path.display().to_string()),
        }
    }

    /// Diagnoses a freshly uploaded image and opens a session for follow-up chat.
    pub async fn open_session(
        &self,
        store: &SessionStore,
        image_path: &Path,
        symptoms: Option<&str>,
    ) -> Result<SessionStart, DiagnosisError> {
        let diagnosis = self.analyze(image_path, symptoms).await?;

        // Seed the conversation with the exchange that produced the diagnosis.
        let seed = vec![
            Turn {
                role: Role::User,
                text: format!("I'm having issues with my plant. Symptoms: {}", diagnosis.symptoms),
            },
            Turn {
                role: Role::Assistant,
                text: diagnosis.model_text.clone(),
            },
        ];
        let session_id = store
            .create_seeded_session(
                image_path.to_path_buf(),
                diagnosis.model_text.clone(),
                seed,
                diagnosis.trace_id.clone(),
            )
            .await;

        info!(session_id = %session_id, image = %image_path.display(), "Session created");

        Ok(SessionStart {
            session_id,
            response: diagnosis.result.format_for_ui(),
            result: diagnosis.result,
        })
    }
}
