use serde::{Deserialize, Serialize};

use crate::api::models::ChatReply;

#[derive(Debug, Deserialize)]
pub struct WsClientMessage {
    pub r#type: String, // Expected: "chat"
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WsServerMessage {
    System { r#type: &'static str, message: String },
    Reply(ChatReply),
}

impl WsServerMessage {
    pub fn system(message: impl Into<String>) -> Self {
        WsServerMessage::System {
            r#type: "system",
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":"Internal serialization error"}"#.to_string()
        })
    }
}
