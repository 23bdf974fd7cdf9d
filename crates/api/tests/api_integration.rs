//! API integration tests.
//!
//! These tests drive the router end to end over an in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    middleware,
};
use quizflow_api::{AppState, middleware::admin_identity, router as api_router};
use quizflow_common::config::FrontendConfig;
use quizflow_core::testing::{
    RecordingDispatch, ScriptedGenerator, seed_invitation, seed_roster, valid_question,
};
use quizflow_core::{
    CancelSignal, DispatchService, InvitationService, SnapshotScorer, WorkflowDependencies,
    WorkflowOrchestrator, WorkflowSettings,
};
use quizflow_db::MemoryStore;
use quizflow_db::models::InsertMode;
use quizflow_db::store::InvitationStore;
use serde_json::{Value, json};
use tower::ServiceExt;

/// Create a test router over `store` with a dispatcher that always delivers.
fn create_test_router(store: &MemoryStore) -> Router {
    let dispatch: DispatchService = Arc::new(RecordingDispatch::delivering("brevo"));
    let invitation_service = InvitationService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        dispatch.clone(),
        FrontendConfig {
            url: "https://quiz.example.com".to_string(),
        },
        "Quizflow",
    );
    let workflow_orchestrator = WorkflowOrchestrator::new(
        WorkflowDependencies {
            workflows: Arc::new(store.clone()),
            questions: Arc::new(store.clone()),
            directory: Arc::new(store.clone()),
            results: Arc::new(store.clone()),
            invitations: invitation_service.clone(),
            dispatch,
            generator: Arc::new(ScriptedGenerator::returning(
                (0..5).map(valid_question).collect(),
            )),
            scorer: Arc::new(SnapshotScorer),
        },
        WorkflowSettings {
            top_n: 5,
            min_completion_ratio: 1.0,
            from_name: "Quizflow".to_string(),
        },
    );

    let state = AppState {
        invitation_service,
        workflow_orchestrator,
        shutdown: CancelSignal::never(),
    };

    api_router()
        .layer(middleware::from_fn(admin_identity))
        .with_state(state)
}

/// A roster of two students on `quiz1`, owned by `admin1`, plus one
/// unsent invitation with token `token-inv1`.
async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    seed_roster(&store, "quiz1", "admin1", 2).await;
    store
        .insert(
            seed_invitation("inv1", "quiz1", "student-1", 3),
            InsertMode::Exclusive,
        )
        .await
        .unwrap();
    store
}

fn request(method: &str, uri: &str, admin: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(admin) = admin {
        builder = builder.header("X-Admin-Id", admin);
    }
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn all_answers(count: u32) -> Value {
    let answers: Vec<Value> = (1..=count)
        .map(|order| json!({ "questionOrder": order, "answer": "Option A" }))
        .collect();
    json!({ "answers": answers })
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_router(&MemoryStore::new());

    let response = app
        .oneshot(request("GET", "/health", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_workflow_trigger_requires_admin() {
    let app = create_test_router(&seeded_store().await);

    let response = app
        .oneshot(request("POST", "/workflows/quiz1/complete", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_workflow_complete_reports_stages() {
    let store = MemoryStore::new();
    seed_roster(&store, "quiz1", "admin1", 3).await;
    let app = create_test_router(&store);

    let response = app
        .clone()
        .oneshot(request("POST", "/workflows/quiz1/complete", Some("admin1"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["success"], true);
    assert_eq!(
        body["data"]["stepsCompleted"],
        json!(["QUESTIONS_GENERATED", "INVITATIONS_SENT"])
    );
    assert_eq!(
        body["data"]["pendingStages"],
        json!(["AWAITING_COMPLETION", "SCORED", "NOTIFIED"])
    );

    let response = app
        .oneshot(request("GET", "/quizzes/quiz1/invitations", Some("admin1"), None))
        .await
        .unwrap();
    let body = json_body(response).await;
    let invitations = body["data"].as_array().unwrap();
    assert_eq!(invitations.len(), 3);
    assert!(invitations.iter().all(|i| i["isUsed"] == false));
    assert!(invitations.iter().all(|i| !i["sentAt"].is_null()));
}

#[tokio::test]
async fn test_workflow_of_other_admin_is_forbidden() {
    let app = create_test_router(&seeded_store().await);

    let response = app
        .oneshot(request("POST", "/workflows/quiz1/automated", Some("intruder"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_workflow_status_of_unknown_quiz() {
    let app = create_test_router(&MemoryStore::new());

    let response = app
        .oneshot(request("GET", "/workflows/missing", Some("admin1"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_student_view_hides_correct_answers() {
    let app = create_test_router(&seeded_store().await);

    let response = app
        .oneshot(request("GET", "/quiz/token-inv1", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["isUsed"], false);
    assert_eq!(body["data"]["quizSnapshot"]["timePerQuestion"], 30);
    assert_eq!(body["data"]["questions"].as_array().unwrap().len(), 3);
    assert!(!body.to_string().contains("correctAnswer"));
}

#[tokio::test]
async fn test_unknown_token_returns_404() {
    let app = create_test_router(&seeded_store().await);

    let response = app
        .oneshot(request("GET", "/quiz/not-a-token", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_succeeds_once() {
    let app = create_test_router(&seeded_store().await);

    let first = app
        .clone()
        .oneshot(request("POST", "/quiz/token-inv1/submit", None, Some(all_answers(3))))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let body = json_body(first).await;
    assert_eq!(body["data"]["invitationId"], "inv1");
    assert_eq!(body["data"]["answered"], 3);

    let second = app
        .oneshot(request("POST", "/quiz/token-inv1/submit", None, Some(all_answers(3))))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = json_body(second).await;
    assert_eq!(body["error"]["code"], "ALREADY_USED");
}

#[tokio::test]
async fn test_submit_without_answers_is_rejected() {
    let app = create_test_router(&seeded_store().await);

    let response = app
        .oneshot(request(
            "POST",
            "/quiz/token-inv1/submit",
            None,
            Some(json!({ "answers": [] })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resend_keeps_token() {
    let app = create_test_router(&seeded_store().await);

    let response = app
        .clone()
        .oneshot(request("POST", "/invitations/inv1/resend", Some("admin1"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["status"], "delivered");
    assert_eq!(body["data"]["provider"], "brevo");

    let response = app
        .oneshot(request("GET", "/invitations", Some("admin1"), None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"][0]["token"], "token-inv1");
    assert!(!body["data"][0]["sentAt"].is_null());
}

#[tokio::test]
async fn test_reissue_retires_old_token() {
    let app = create_test_router(&seeded_store().await);

    let response = app
        .clone()
        .oneshot(request("POST", "/invitations/inv1/reissue", Some("admin1"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    let new_token = body["data"]["token"].as_str().unwrap().to_string();
    assert_ne!(new_token, "token-inv1");
    assert_eq!(body["data"]["questionCount"], 3);

    let old = app
        .clone()
        .oneshot(request("GET", "/quiz/token-inv1", None, None))
        .await
        .unwrap();
    assert_eq!(old.status(), StatusCode::GONE);

    let new = app
        .oneshot(request("GET", &format!("/quiz/{new_token}"), None, None))
        .await
        .unwrap();
    assert_eq!(new.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_delete_invitation() {
    let app = create_test_router(&seeded_store().await);

    let response = app
        .clone()
        .oneshot(request("DELETE", "/invitations/inv1", Some("intruder"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(request("DELETE", "/invitations/inv1", Some("admin1"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(request("GET", "/quiz/token-inv1", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
