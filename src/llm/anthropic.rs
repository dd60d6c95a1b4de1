use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::llm::{
    http_client,
    models::{ChatOptions, ChatResponse, FunctionCall, Message, ToolCall, ToolDefinition, Usage},
    LlmError, LlmProvider,
};

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: String, default_model: String, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_key,
            base_url,
            default_model,
        }
    }
}

/// Anthropic wants tool calls as `tool_use` content blocks on the assistant
/// turn and tool output as `tool_result` blocks on a user turn.
fn to_anthropic_message(m: &Message) -> Value {
    match m.role.as_str() {
        "tool" => json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
                "content": m.content,
            }]
        }),
        "assistant" if m.tool_calls.is_some() => {
            let mut blocks = Vec::new();
            if !m.content.is_empty() {
                blocks.push(json!({"type": "text", "text": m.content}));
            }
            for call in m.tool_calls.iter().flatten() {
                let input: Value =
                    serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));
                blocks.push(json!({
                    "type": "tool_use",
                    "id": call.id.clone().unwrap_or_default(),
                    "name": call.function.name,
                    "input": input,
                }));
            }
            json!({"role": "assistant", "content": blocks})
        }
        _ => json!({"role": m.role, "content": m.content}),
    }
}

fn to_anthropic_tool(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.function.name,
        "description": tool.function.description,
        "input_schema": tool.function.parameters,
    })
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);

        // Anthropic requires the 'system' prompt as a separate field
        let mut system = String::new();
        let filtered_messages: Vec<Value> = messages
            .iter()
            .filter_map(|m| {
                if m.role == "system" {
                    system.push_str(&m.content);
                    system.push('\n');
                    None
                } else {
                    Some(to_anthropic_message(m))
                }
            })
            .collect();

        if let Some(opts_system) = &options.system_prompt {
            system.push_str(opts_system);
        }

        let mut body = json!({
            "model": model,
            "messages": filtered_messages,
            "system": system.trim(),
            "temperature": options.temperature.unwrap_or(0.7),
            "max_tokens": options.max_tokens.unwrap_or(1024),
        });

        if let Some(tools) = options.tools.as_ref().filter(|t| !t.is_empty()) {
            body["tools"] = Value::Array(tools.iter().map(to_anthropic_tool).collect());
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
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
            return Err(LlmError::Api(format!("Anthropic Error {}: {}", status, text)));
        }

        let json: Value = response.json().await?;

        let blocks = json["content"]
            .as_array()
            .ok_or_else(|| LlmError::InvalidResponse("missing content blocks".to_string()))?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block["type"].as_str() {
                Some("text") => content.push_str(block["text"].as_str().unwrap_or_default()),
                Some("tool_use") => tool_calls.push(ToolCall {
                    id: block["id"].as_str().map(|s| s.to_string()),
                    r#type: Some("function".to_string()),
                    function: FunctionCall {
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        arguments: block["input"].to_string(),
                    },
                }),
                _ => {}
            }
        }

        let usage = json.get("usage").map(|u| Usage {
            input_tokens: u["input_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["output_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(ChatResponse {
            content,
            model: model.to_string(),
            usage,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            trace_id: json["id"].as_str().map(|s| s.to_string()),
        })
    }

    fn supported_models(&self) -> Vec<&str> {
        vec!["claude-3-5-sonnet-latest", "claude-3-5-haiku-latest"]
    }
}
