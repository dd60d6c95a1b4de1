#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use plant_doctor::api::AppState;
use plant_doctor::chat::ChatResponder;
use plant_doctor::diagnosis::DiagnosisComposer;
use plant_doctor::llm::models::{ChatOptions, ChatResponse, FunctionCall, Message, ToolCall};
use plant_doctor::llm::{LlmError, LlmProvider};
use plant_doctor::session::SessionStore;
use plant_doctor::storage::{FileStorage, LocalFileStorage};
use plant_doctor::vision::{DetectedObject, VisionDescriber, VisionError};

pub const DIAGNOSIS_JSON: &str = r#"{"possible_diagnosis": ["Late blight"], "causes": ["Phytophthora infestans"], "remedies_or_cure": ["Remove infected leaves", "Apply copper fungicide"]}"#;

pub const BOUNDARY: &str = "plantdoctorboundary7MA4YWxk";

#[derive(Clone)]
pub enum Reply {
    Text(String),
    /// Tool name and JSON arguments for each requested call.
    Tools(Vec<(&'static str, &'static str)>),
    Fail,
}

/// Replays a script, then answers every further call with `fallback`.
pub struct MockLlm {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: AtomicUsize,
    requests: Mutex<Vec<(Vec<Message>, ChatOptions)>>,
}

impl MockLlm {
    pub fn new(script: Vec<Reply>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Diagnoses with `DIAGNOSIS_JSON`, then answers chat with `answer`.
    pub fn diagnosing(answer: &str) -> Arc<Self> {
        Self::new(
            vec![Reply::Text(DIAGNOSIS_JSON.to_string())],
            Reply::Text(answer.to_string()),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(Vec<Message>, ChatOptions)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), options));

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let (content, tool_calls) = match reply {
            Reply::Text(text) => (text, None),
            Reply::Tools(calls) => (
                String::new(),
                Some(
                    calls
                        .into_iter()
                        .enumerate()
                        .map(|(i, (name, args))| ToolCall {
                            id: Some(format!("call_{}_{}", n, i)),
                            r#type: Some("function".to_string()),
                            function: FunctionCall {
                                name: name.to_string(),
                                arguments: args.to_string(),
                            },
                        })
                        .collect(),
                ),
            ),
            Reply::Fail => return Err(LlmError::Api("mock outage".to_string())),
        };

        Ok(ChatResponse {
            content,
            model: "mock-model".to_string(),
            usage: None,
            tool_calls,
            trace_id: Some(format!("run-{}", n)),
        })
    }

    fn supported_models(&self) -> Vec<&str> {
        vec!["mock-model"]
    }
}

/// Fixed caption and detections; still decodes the file so bad images fail like the real one.
#[derive(Default)]
pub struct MockVision {
    pub captions: AtomicUsize,
    pub detections: AtomicUsize,
}

#[async_trait]
impl VisionDescriber for MockVision {
    async fn caption(&self, _image_path: &Path) -> Result<String, VisionError> {
        self.captions.fetch_add(1, Ordering::SeqCst);
        Ok("a green leaf with brown spots".to_string())
    }

    async fn detect(&self, _image_path: &Path) -> Result<Vec<DetectedObject>, VisionError> {
        self.detections.fetch_add(1, Ordering::SeqCst);
        Ok(vec![DetectedObject {
            bounding_box: (2, 3, 60, 70),
            label: "potted plant".to_string(),
            confidence: 0.97,
        }])
    }
}

/// Storage that has lost every file it was ever given.
pub struct VanishedFiles;

#[async_trait]
impl FileStorage for VanishedFiles {
    async fn save(&self, _bytes: &[u8], suggested_name: &str) -> std::io::Result<PathBuf> {
        Ok(PathBuf::from(suggested_name))
    }

    async fn exists(&self, _path: &Path) -> bool {
        false
    }

    async fn delete(&self, _path: &Path) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([60, 140, 50]));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn write_png(path: &Path) {
    std::fs::write(path, png_bytes()).unwrap();
}

pub enum Part<'a> {
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File {
                name,
                filename,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

pub struct Harness {
    pub state: actix_web::web::Data<AppState>,
    pub llm: Arc<MockLlm>,
    pub vision: Arc<MockVision>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub async fn new(llm: Arc<MockLlm>) -> Self {
        Self::with_iterations(llm, 5).await
    }

    pub async fn with_iterations(llm: Arc<MockLlm>, max_iterations: usize) -> Self {
        Self::build(llm, max_iterations, 10 * 1024 * 1024).await
    }

    pub async fn build(llm: Arc<MockLlm>, max_iterations: usize, max_upload_bytes: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let vision = Arc::new(MockVision::default());
        let store = Arc::new(SessionStore::new());
        let uploads: Arc<dyn FileStorage> =
            Arc::new(LocalFileStorage::new(dir.path().join("uploads")).await.unwrap());

        let composer = Arc::new(DiagnosisComposer::new(llm.clone(), vision.clone()));
        let responder = Arc::new(ChatResponder::new(
            store.clone(),
            llm.clone(),
            vision.clone(),
            uploads.clone(),
            max_iterations,
            "You are a plant doctor.".to_string(),
        ));

        let state = AppState {
            store,
            composer,
            responder,
            uploads,
            scratch: Arc::new(LocalFileStorage::new(dir.path().join("image")).await.unwrap()),
            feedback: None,
            max_upload_bytes,
        };

        Self {
            state: actix_web::web::Data::new(state),
            llm,
            vision,
            dir,
        }
    }

    pub fn files_in(&self, sub: &str) -> usize {
        std::fs::read_dir(self.dir.path().join(sub)).unwrap().count()
    }
}
