use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::llm::{
    http_client,
    models::{ChatOptions, ChatResponse, FunctionCall, Message, ToolCall},
    LlmError, LlmProvider,
};

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    default_model: String,
}

impl OllamaProvider {
    pub fn new(base_url: String, default_model: String, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            base_url,
            default_model,
        }
    }
}

/// Ollama returns arguments as a JSON object rather than an encoded string.
fn parse_tool_calls(value: &serde_json::Value) -> Option<Vec<ToolCall>> {
    let calls: Vec<ToolCall> = value
        .as_array()?
        .iter()
        .filter_map(|f| {
            let func_obj = if f.get("function").is_some() { &f["function"] } else { f };

            let name = func_obj["name"].as_str()?.to_string();
            let arguments = if func_obj["arguments"].is_string() {
                func_obj["arguments"].as_str()?.to_string()
            } else {
                func_obj["arguments"].to_string()
            };

            Some(ToolCall {
                id: f["id"].as_str().map(|s| s.to_string()),
                r#type: Some("function".to_string()),
                function: FunctionCall { name, arguments },
            })
        })
        .collect();

    (!calls.is_empty()).then_some(calls)
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
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
            "stream": false,
            "options": {
                "temperature": options.temperature.unwrap_or(0.7),
                "num_predict": options.max_tokens.unwrap_or(1024)
            }
        });

        if let Some(tools) = options.tools.as_ref().filter(|t| !t.is_empty()) {
            body["tools"] = json!(tools);
        }

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LlmError::RateLimited);
            }
            return Err(LlmError::Api(format!("Ollama Error {}: {}", status, text)));
        }

        let json: serde_json::Value = response.json().await?;

        let message = &json["message"];
        if message.is_null() {
            return Err(LlmError::InvalidResponse("missing message".to_string()));
        }

        Ok(ChatResponse {
            content: message["content"].as_str().unwrap_or_default().to_string(),
            model: model.to_string(),
            usage: None,
            tool_calls: parse_tool_calls(&message["tool_calls"]),
            trace_id: None,
        })
    }

    fn supported_models(&self) -> Vec<&str> {
        vec!["llama3.2", "mistral"]
    }
}
