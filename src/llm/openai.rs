use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::llm::{
    http_client,
    models::{ChatOptions, ChatResponse, Message, ToolCall, Usage},
    LlmError, LlmProvider,
};

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: String, default_model: String, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_key,
            base_url,
            default_model,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);

        let mut final_messages: Vec<Message> = messages.to_vec();
        if let Some(system) = &options.system_prompt {
            final_messages.insert(0, Message::system(system.clone()));
        }

        let mut body = json!({
            "model": model,
            "messages": final_messages,
            "temperature": options.temperature.unwrap_or(0.7),
            "max_tokens": options.max_tokens.unwrap_or(1024),
        });

        if let Some(tools) = options.tools.as_ref().filter(|t| !t.is_empty()) {
            body["tools"] = json!(tools);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LlmError::RateLimited);
            }
            return Err(LlmError::Api(format!("OpenAI Error {}: {}", status, text)));
        }

        let json: serde_json::Value = response.json().await?;

        let message = &json["choices"][0]["message"];
        if message.is_null() {
            return Err(LlmError::InvalidResponse("missing choices[0].message".to_string()));
        }

        // Content is null when the model only requested tools.
        let content = message["content"].as_str().unwrap_or_default().to_string();

        let tool_calls: Option<Vec<ToolCall>> = message
            .get("tool_calls")
            .filter(|tc| !tc.is_null())
            .and_then(|tc| serde_json::from_value(tc.clone()).ok());

        let usage = json.get("usage").map(|u| Usage {
            input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(ChatResponse {
            content,
            model: json["model"].as_str().unwrap_or(model).to_string(),
            usage,
            tool_calls,
            trace_id: json["id"].as_str().map(|s| s.to_string()),
        })
    }

    fn supported_models(&self) -> Vec<&str> {
        vec!["gpt-4o", "gpt-4o-mini", "gpt-4-turbo"]
    }
}
