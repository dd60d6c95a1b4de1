use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Missing credential: {0}")]
    MissingCredential(String),
    #[error("Unknown LLM provider '{0}'")]
    UnknownProvider(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// Empty means the API is open.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base")]
    pub api_base: String,
    pub api_key: String,
    #[serde(default = "default_openai_model")]
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnthropicConfig {
    #[serde(default = "default_anthropic_base")]
    pub api_base: String,
    pub api_key: String,
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_timeout")]
    pub request_timeout_secs: u64,
    pub openai: Option<OpenAiConfig>,
    pub anthropic: Option<AnthropicConfig>,
    pub ollama: Option<OllamaConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VisionConfig {
    #[serde(default = "default_vision_base")]
    pub base_url: String,
    pub api_token: Option<String>,
    #[serde(default = "default_caption_model")]
    pub caption_model: String,
    #[serde(default = "default_detection_model")]
    pub detection_model: String,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_vision_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: default_vision_base(),
            api_token: None,
            caption_model: default_caption_model(),
            detection_model: default_detection_model(),
            confidence_threshold: default_confidence_threshold(),
            request_timeout_secs: default_vision_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    /// Scratch directory for the one-shot diagnosis endpoint.
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
    /// Largest accepted multipart field, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            image_dir: default_image_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_max_iterations")]
    pub max_agent_iterations: usize,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_agent_iterations: default_max_iterations(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionConfig {
    /// Sessions idle longer than this are swept. Unset keeps them for the process lifetime.
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedbackConfig {
    pub api_base: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub feedback: Option<FeedbackConfig>,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("PLANT_DOCTOR").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Expand environment variables if present like ${OPENAI_API_KEY}
        app_config.server.host = expand_env(&app_config.server.host);
        app_config.storage.upload_dir = expand_env(&app_config.storage.upload_dir);
        app_config.storage.image_dir = expand_env(&app_config.storage.image_dir);

        if let Some(ref mut openai) = app_config.llm.openai {
            openai.api_key = expand_env(&openai.api_key);
        }
        if let Some(ref mut anthropic) = app_config.llm.anthropic {
            anthropic.api_key = expand_env(&anthropic.api_key);
        }
        if let Some(ref mut token) = app_config.vision.api_token {
            *token = expand_env(token);
        }
        if let Some(ref mut feedback) = app_config.feedback {
            feedback.api_key = expand_env(&feedback.api_key);
        }

        app_config.validate()?;
        Ok(app_config)
    }

    /// Fails fast when the selected provider has no usable credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.llm.provider.as_str() {
            "openai" => match &self.llm.openai {
                Some(cfg) if !cfg.api_key.trim().is_empty() => Ok(()),
                _ => Err(ConfigError::MissingCredential(
                    "llm.openai.api_key (set OPENAI_API_KEY)".to_string(),
                )),
            },
            "anthropic" => match &self.llm.anthropic {
                Some(cfg) if !cfg.api_key.trim().is_empty() => Ok(()),
                _ => Err(ConfigError::MissingCredential(
                    "llm.anthropic.api_key".to_string(),
                )),
            },
            "ollama" => match &self.llm.ollama {
                Some(_) => Ok(()),
                None => Err(ConfigError::MissingCredential(
                    "llm.ollama section".to_string(),
                )),
            },
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

fn expand_env(val: &str) -> String {
    if val.starts_with("${") && val.ends_with('}') {
        let var_name = &val[2..val.len() - 1];
        std::env::var(var_name).unwrap_or_default()
    } else {
        val.to_string()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_anthropic_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_vision_base() -> String {
    "https://api-inference.huggingface.co/models".to_string()
}

fn default_caption_model() -> String {
    "Salesforce/blip-image-captioning-large".to_string()
}

fn default_detection_model() -> String {
    "facebook/detr-resnet-50".to_string()
}

fn default_confidence_threshold() -> f32 {
    0.9
}

fn default_vision_timeout() -> u64 {
    60
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

fn default_image_dir() -> String {
    "image".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_iterations() -> usize {
    5
}

fn default_system_prompt() -> String {
    "You are a plant disease diagnosis expert helping a gardener with a plant they photographed. \
     Answer follow-up questions using the initial diagnosis and the conversation so far. \
     You may call the image tools to look at the uploaded plant photo again."
        .to_string()
}
