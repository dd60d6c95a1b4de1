use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_ws::Message;
use futures_util::StreamExt as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::models::ChatReply;
use crate::api::models_ws::{WsClientMessage, WsServerMessage};
use crate::api::AppState;
use crate::chat::ChatResponder;

const CONNECTED: &str = "Connected to plant disease diagnosis system";
const PROCESSING: &str = "Processing your message...";
const INVALID_FORMAT: &str = "Invalid message format";

/// Chat channel for one session. Frames are handled strictly in arrival order.
/// Closing the socket leaves the session untouched.
#[get("/ws/{session_id}")]
pub async fn ws_session(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<AppState>,
    session_id: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let (response, mut socket, mut msg_stream) = actix_ws::handle(&req, body)?;
    let id = session_id.into_inner();
    let responder = state.responder.clone();

    info!(session_id = %id, "WebSocket connected");

    actix_web::rt::spawn(async move {
        if send(&mut socket, &WsServerMessage::system(CONNECTED)).await.is_err() {
            return;
        }

        while let Some(Ok(msg)) = msg_stream.next().await {
            match msg {
                Message::Ping(bytes) => {
                    if socket.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Message::Text(text) => {
                    if handle_text(&text, &id, &responder, &mut socket).await.is_err() {
                        break;
                    }
                }
                Message::Close(reason) => {
                    let _ = socket.close(reason).await;
                    info!(session_id = %id, "WebSocket disconnected");
                    return;
                }
                _ => {}
            }
        }
        info!(session_id = %id, "WebSocket disconnected");
    });

    Ok(response)
}

async fn send(socket: &mut actix_ws::Session, frame: &WsServerMessage) -> Result<(), actix_ws::Closed> {
    socket.text(frame.to_json()).await
}

async fn handle_text(
    text: &str,
    session_id: &str,
    responder: &Arc<ChatResponder>,
    socket: &mut actix_ws::Session,
) -> Result<(), actix_ws::Closed> {
    let client_msg = match serde_json::from_str::<WsClientMessage>(text) {
        Ok(m) => m,
        Err(e) => {
            debug!(session_id, error = %e, "Unparseable WebSocket frame");
            return send(socket, &WsServerMessage::Reply(ChatReply::err(INVALID_FORMAT))).await;
        }
    };

    if client_msg.r#type != "chat" {
        debug!(session_id, kind = %client_msg.r#type, "Ignoring WebSocket frame");
        return Ok(());
    }

    send(socket, &WsServerMessage::system(PROCESSING)).await?;

    let reply = match responder.respond(session_id, &client_msg.message).await {
        Ok(response) => ChatReply::ok(response),
        Err(e) => {
            warn!(session_id, error = %e, "WebSocket chat turn failed");
            ChatReply::err(e.user_message())
        }
    };
    send(socket, &WsServerMessage::Reply(reply)).await
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(ws_session);
}
