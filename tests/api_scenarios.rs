mod common;

use actix_web::http::{header::CONTENT_TYPE, StatusCode};
use actix_web::{test, App};
use serde_json::{json, Value};

use common::{multipart_body, multipart_content_type, png_bytes, Harness, MockLlm, Part, Reply};
use plant_doctor::api::{routes, websocket};
use plant_doctor::chat::{IMAGE_UNAVAILABLE, INVALID_SESSION};
use plant_doctor::session::Role;

fn upload_request(uri: &str, content_type: &str, bytes: &[u8], symptoms: Option<&str>) -> test::TestRequest {
    let mut parts = vec![Part::File {
        name: "file",
        filename: "leaf.png",
        content_type,
        bytes,
    }];
    if let Some(value) = symptoms {
        parts.push(Part::Text {
            name: "symptoms",
            value,
        });
    }
    test::TestRequest::post()
        .uri(uri)
        .insert_header((CONTENT_TYPE, multipart_content_type()))
        .set_payload(multipart_body(&parts))
}

#[actix_web::test]
async fn upload_opens_a_session_with_formatted_diagnosis() {
    let h = Harness::new(MockLlm::diagnosing("unused")).await;
    let app = test::init_service(
        App::new()
            .app_data(h.state.clone())
            .configure(routes::configure)
            .configure(websocket::configure),
    )
    .await;

    let png = png_bytes();
    let req = upload_request("/api/upload", "image/png", &png, Some("Brown spots on lower leaves")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    let session_id = body["session_id"].as_str().unwrap();
    assert!(!session_id.is_empty());
    let response = body["response"].as_str().unwrap();
    for section in ["Possible Diagnosis", "Causes", "Remedies", "Late blight"] {
        assert!(response.contains(section), "missing {section} in {response}");
    }
    assert!(body["file_path"].as_str().unwrap().starts_with("/uploads/"));

    let session = h.state.store.get(session_id).await.unwrap();
    assert_eq!(session.history.len(), 2);
    assert_eq!(session.history[0].role, Role::User);
    assert!(session.history[0].text.contains("Brown spots on lower leaves"));
    assert_eq!(session.history[1].role, Role::Assistant);
    assert_eq!(session.initial_diagnosis, common::DIAGNOSIS_JSON);
    assert!(session.image_path.exists());
    assert_eq!(h.llm.calls(), 1);
}

#[actix_web::test]
async fn each_upload_gets_its_own_session() {
    let h = Harness::new(MockLlm::new(vec![], Reply::Text(common::DIAGNOSIS_JSON.to_string()))).await;
    let app = test::init_service(App::new().app_data(h.state.clone()).configure(routes::configure)).await;

    let png = png_bytes();
    let mut ids = Vec::new();
    for _ in 0..2 {
        let req = upload_request("/api/upload", "image/png", &png, None).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        ids.push(body["session_id"].as_str().unwrap().to_string());
    }
    assert_ne!(ids[0], ids[1]);
    assert_eq!(h.state.store.len().await, 2);
}

#[actix_web::test]
async fn corrupt_upload_is_rejected_and_cleaned_up() {
    let h = Harness::new(MockLlm::diagnosing("unused")).await;
    let app = test::init_service(App::new().app_data(h.state.clone()).configure(routes::configure)).await;

    let req = upload_request("/api/upload", "image/png", b"not really a png", None).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("Error loading image"));
    assert_eq!(h.llm.calls(), 0);
    assert!(h.state.store.is_empty().await);
    assert_eq!(h.files_in("uploads"), 0);
}

#[actix_web::test]
async fn chat_with_unknown_session_is_refused() {
    let h = Harness::new(MockLlm::diagnosing("unused")).await;
    let app = test::init_service(App::new().app_data(h.state.clone()).configure(routes::configure)).await;

    let req = test::TestRequest::post()
        .uri("/api/chat")
        .set_json(json!({"session_id": "does-not-exist", "message": "hello"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], INVALID_SESSION);
    assert!(INVALID_SESSION.starts_with("Invalid session ID"));
    assert_eq!(h.llm.calls(), 0);
}

#[actix_web::test]
async fn oversized_upload_is_rejected() {
    let h = Harness::build(MockLlm::diagnosing("unused"), 5, 16).await;
    let app = test::init_service(App::new().app_data(h.state.clone()).configure(routes::configure)).await;

    let image = png_bytes();
    assert!(image.len() > 16);
    let req = upload_request("/api/upload", "image/png", &image, None).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["detail"], "Upload exceeds the 16 byte limit");
    assert_eq!(h.llm.calls(), 0);
    assert!(h.state.store.is_empty().await);
    assert_eq!(h.files_in("uploads"), 0);
}

#[actix_web::test]
async fn strict_endpoint_rejects_non_images() {
    let h = Harness::new(MockLlm::diagnosing("unused")).await;
    let app = test::init_service(App::new().app_data(h.state.clone()).configure(routes::configure)).await;

    let req = upload_request("/api/diagnose-plant-disease/", "text/plain", b"hello", None).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Uploaded file must be an image");
    assert_eq!(h.llm.calls(), 0);
    assert_eq!(h.files_in("image"), 0);
}

#[actix_web::test]
async fn strict_endpoint_returns_structured_result_and_deletes_file() {
    let h = Harness::new(MockLlm::diagnosing("unused")).await;
    let app = test::init_service(App::new().app_data(h.state.clone()).configure(routes::configure)).await;

    let png = png_bytes();
    let req = upload_request("/api/diagnose-plant-disease/", "image/png", &png, None).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["possible_diagnosis"], json!(["Late blight"]));
    assert_eq!(body["causes"], json!(["Phytophthora infestans"]));
    assert_eq!(
        body["remedies_or_cure"],
        json!(["Remove infected leaves", "Apply copper fungicide"])
    );
    assert!(body.get("raw_text").is_none());
    assert_eq!(h.files_in("image"), 0);
    assert!(h.state.store.is_empty().await);
}

#[actix_web::test]
async fn strict_endpoint_reports_model_outage() {
    let h = Harness::new(MockLlm::new(vec![], Reply::Fail)).await;
    let app = test::init_service(App::new().app_data(h.state.clone()).configure(routes::configure)).await;

    let png = png_bytes();
    let req = upload_request("/api/diagnose-plant-disease/", "image/jpeg", &png, None).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
    assert_eq!(h.files_in("image"), 0);
}

#[actix_web::test]
async fn back_to_back_chats_append_in_order() {
    let llm = MockLlm::new(
        vec![
            Reply::Text(common::DIAGNOSIS_JSON.to_string()),
            Reply::Text("Water at the base, not the leaves.".to_string()),
            Reply::Text("Yes, copper sprays are fine for tomatoes.".to_string()),
        ],
        Reply::Fail,
    );
    let h = Harness::new(llm).await;
    let app = test::init_service(App::new().app_data(h.state.clone()).configure(routes::configure)).await;

    let png = png_bytes();
    let req = upload_request("/api/upload", "image/png", &png, None).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let questions = ["How should I water it?", "Can I use copper?"];
    let answers = [
        "Water at the base, not the leaves.",
        "Yes, copper sprays are fine for tomatoes.",
    ];
    for (question, answer) in questions.iter().zip(answers) {
        let req = test::TestRequest::post()
            .uri("/api/chat")
            .set_json(json!({"session_id": session_id, "message": question}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["response"], answer);
    }

    let session = h.state.store.get(&session_id).await.unwrap();
    let tail: Vec<(Role, &str)> = session.history[2..]
        .iter()
        .map(|t| (t.role, t.text.as_str()))
        .collect();
    assert_eq!(
        tail,
        vec![
            (Role::User, questions[0]),
            (Role::Assistant, answers[0]),
            (Role::User, questions[1]),
            (Role::Assistant, answers[1]),
        ]
    );

    // The follow-up prompt carries the initial diagnosis on every turn.
    let (last_messages, _) = h.llm.requests().pop().unwrap();
    let prompt = &last_messages.last().unwrap().content;
    assert!(prompt.contains("Can I use copper?"));
    assert!(prompt.contains("Late blight"));
}

#[actix_web::test]
async fn chat_after_image_removed_asks_for_new_upload() {
    let h = Harness::new(MockLlm::diagnosing("should not be called")).await;
    let app = test::init_service(App::new().app_data(h.state.clone()).configure(routes::configure)).await;

    let png = png_bytes();
    let req = upload_request("/api/upload", "image/png", &png, None).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let session = h.state.store.get(&session_id).await.unwrap();
    std::fs::remove_file(&session.image_path).unwrap();

    let req = test::TestRequest::post()
        .uri("/api/chat")
        .set_json(json!({"session_id": session_id, "message": "Is it spreading?"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["response"], IMAGE_UNAVAILABLE);

    assert_eq!(h.state.store.get(&session_id).await.unwrap().history.len(), 2);
    assert_eq!(h.llm.calls(), 1);
}

#[actix_web::test]
async fn model_outage_during_chat_leaves_history_alone() {
    let llm = MockLlm::new(vec![Reply::Text(common::DIAGNOSIS_JSON.to_string())], Reply::Fail);
    let h = Harness::new(llm).await;
    let app = test::init_service(App::new().app_data(h.state.clone()).configure(routes::configure)).await;

    let png = png_bytes();
    let req = upload_request("/api/upload", "image/png", &png, None).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/chat")
        .set_json(json!({"session_id": session_id, "message": "What now?"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);

    assert_eq!(h.state.store.get(&session_id).await.unwrap().history.len(), 2);
}

#[actix_web::test]
async fn session_inspection_and_feedback_without_backend() {
    let h = Harness::new(MockLlm::diagnosing("unused")).await;
    let app = test::init_service(App::new().app_data(h.state.clone()).configure(routes::configure)).await;

    let png = png_bytes();
    let req = upload_request("/api/upload", "image/png", &png, None).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri(&format!("/api/sessions/{}", session_id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["session"]["session_id"], session_id.as_str());
    assert_eq!(body["session"]["phase"], "diagnosed");
    assert_eq!(body["session"]["trace_ids"], json!(["run-1"]));

    let req = test::TestRequest::get().uri("/api/sessions/missing").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/api/feedback")
        .set_json(json!({"session_id": session_id, "message_id": "m1", "score": 1.0}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn health_endpoints_respond() {
    let h = Harness::new(MockLlm::diagnosing("unused")).await;
    let app = test::init_service(App::new().app_data(h.state.clone()).configure(routes::configure)).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");

    let req = test::TestRequest::get().uri("/").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}
