use actix_multipart::Multipart;
use actix_web::{get, post, web, HttpResponse, Responder};
use futures_util::StreamExt as _;
use std::path::Path;
use tracing::{error, info, warn};

use crate::api::models::{
    ChatReply, ChatRequest, FeedbackRequest, FeedbackResponse, SessionResponse, UploadResponse,
};
use crate::api::{ApiError, AppState};
use crate::chat::{ChatError, INVALID_SESSION};
use crate::diagnosis::{DiagnosisError, DiagnosisResult};

const NOT_AN_IMAGE: &str = "Uploaded file must be an image";

/// The parts of a multipart upload the handlers care about.
struct UploadForm {
    file_name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
    symptoms: Option<String>,
}

impl UploadForm {
    fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }
}

async fn read_upload(mut payload: Multipart, max_bytes: usize) -> Result<UploadForm, ApiError> {
    let malformed = |e: actix_multipart::MultipartError| {
        ApiError::BadRequest(format!("Malformed upload: {}", e))
    };

    let mut file = None;
    let mut symptoms = None;

    while let Some(field) = payload.next().await {
        let mut field = field.map_err(malformed)?;
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let content_type = field.content_type().map(|m| m.essence_str().to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(malformed)?;
            if data.len() + chunk.len() > max_bytes {
                return Err(ApiError::BadRequest(format!(
                    "Upload exceeds the {} byte limit",
                    max_bytes
                )));
            }
            data.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "file" => file = Some((file_name.unwrap_or_else(|| "upload".to_string()), content_type, data)),
            "symptoms" => symptoms = Some(String::from_utf8_lossy(&data).into_owned()),
            _ => {}
        }
    }

    let (file_name, content_type, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }

    Ok(UploadForm {
        file_name,
        content_type,
        bytes,
        symptoms,
    })
}

fn public_path(stored: &Path) -> String {
    let name = stored
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("/uploads/{}", name)
}

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "message": "Plant Disease Diagnosis API is running"
    }))
}

#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "healthy"}))
}

/// Stores the image, diagnoses it and opens a chat session around it.
#[post("/upload")]
pub async fn upload_image(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let form = read_upload(payload, state.max_upload_bytes).await?;

    let stored = state
        .uploads
        .save(&form.bytes, &form.file_name)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to store upload");
            ApiError::Internal("Failed to store the uploaded file".to_string())
        })?;
    info!(file = %stored.display(), size = form.bytes.len(), "Image uploaded");

    match state
        .composer
        .open_session(&state.store, &stored, form.symptoms.as_deref())
        .await
    {
        Ok(start) => Ok(HttpResponse::Ok().json(UploadResponse {
            success: true,
            session_id: start.session_id,
            response: start.response,
            file_path: public_path(&stored),
        })),
        Err(e) => {
            // No session points at the file, so it can go.
            let _ = state.uploads.delete(&stored).await;
            match e {
                DiagnosisError::ImageUnreadable(_) => Err(ApiError::BadRequest(e.user_message())),
                DiagnosisError::ModelCall(_) => Err(ApiError::Internal(e.user_message())),
            }
        }
    }
}

#[post("/chat")]
pub async fn chat(
    state: web::Data<AppState>,
    req: web::Json<ChatRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = req.into_inner();
    if req.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".to_string()));
    }

    match state.responder.respond(&req.session_id, &req.message).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ChatReply::ok(response))),
        Err(e) => {
            if matches!(e, ChatError::SessionNotFound(_)) {
                warn!(session_id = %req.session_id, "Chat for unknown session");
            }
            Err(ApiError::Internal(e.user_message().to_string()))
        }
    }
}

/// One-shot structured diagnosis. Nothing is kept afterwards.
#[post("/diagnose-plant-disease/")]
pub async fn diagnose_plant_disease(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let form = read_upload(payload, state.max_upload_bytes).await?;
    if !form.is_image() {
        return Err(ApiError::BadRequest(NOT_AN_IMAGE.to_string()));
    }

    let stored = state
        .scratch
        .save(&form.bytes, &form.file_name)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to store upload");
            ApiError::Internal("Failed to store the uploaded file".to_string())
        })?;

    let outcome = state.composer.analyze(&stored, form.symptoms.as_deref()).await;

    if let Err(e) = state.scratch.delete(&stored).await {
        warn!(file = %stored.display(), error = %e, "Failed to remove diagnosed image");
    }

    match outcome {
        Ok(diagnosis) => Ok(HttpResponse::Ok().json(diagnosis.result)),
        Err(e @ DiagnosisError::ImageUnreadable(_)) => Err(ApiError::BadRequest(e.user_message())),
        Err(e) => Ok(HttpResponse::InternalServerError().json(
            DiagnosisResult::failure(e.user_message())
                .with_image_path(stored.display().to_string()),
        )),
    }
}

#[get("/sessions/{id}")]
pub async fn get_session(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let session = state
        .store
        .get(&id)
        .await
        .map_err(|_| ApiError::NotFound(INVALID_SESSION.to_string()))?;
    Ok(HttpResponse::Ok().json(SessionResponse {
        success: true,
        session,
    }))
}

#[post("/feedback")]
pub async fn submit_feedback(
    state: web::Data<AppState>,
    req: web::Json<FeedbackRequest>,
) -> impl Responder {
    let req = req.into_inner();
    let rejected = HttpResponse::Ok().json(FeedbackResponse { success: false });

    let Some(client) = state.feedback.as_ref() else {
        warn!("Feedback received but no feedback backend is configured");
        return rejected;
    };

    let run_id = match state.store.get(&req.session_id).await {
        Ok(session) => session.latest_trace_id().map(str::to_string),
        Err(_) => None,
    };
    let Some(run_id) = run_id else {
        warn!(session_id = %req.session_id, message_id = ?req.message_id, "No trace to attach feedback to");
        return rejected;
    };

    match client.submit(&run_id, &req.feedback).await {
        Ok(()) => HttpResponse::Ok().json(FeedbackResponse { success: true }),
        Err(e) => {
            error!(session_id = %req.session_id, error = %e, "Failed to forward feedback");
            rejected
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index).service(health).service(
        web::scope("/api")
            .service(upload_image)
            .service(chat)
            .service(diagnose_plant_disease)
            .service(get_session)
            .service(submit_feedback),
    );
}
