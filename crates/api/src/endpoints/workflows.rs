//! Workflow trigger endpoints.
//!
//! Each trigger runs to completion within the request and returns the
//! resulting stage summary. Runs observe the server's shutdown signal.

use axum::{
    Router,
    extract::{Path, State},
    routing::{get, post},
};
use quizflow_common::AppResult;
use quizflow_core::WorkflowResult;
use tracing::info;

use crate::{extractors::AuthAdmin, middleware::AppState, response::ApiResponse};

// ==================== Handlers ====================

/// Generate questions, send invitations and check completion.
async fn complete(
    AuthAdmin(admin): AuthAdmin,
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
) -> AppResult<ApiResponse<WorkflowResult>> {
    info!(quiz_id = %quiz_id, admin_id = %admin.id, "Workflow run requested: complete");
    let result = state
        .workflow_orchestrator
        .run_complete(&admin, &quiz_id, &state.shutdown)
        .await?;

    Ok(ApiResponse::ok(result))
}

/// Score completed attempts and notify the top students.
async fn scoring(
    AuthAdmin(admin): AuthAdmin,
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
) -> AppResult<ApiResponse<WorkflowResult>> {
    info!(quiz_id = %quiz_id, admin_id = %admin.id, "Workflow run requested: scoring");
    let result = state
        .workflow_orchestrator
        .run_scoring(&admin, &quiz_id, &state.shutdown)
        .await?;

    Ok(ApiResponse::ok(result))
}

/// Run every stage that is not yet done.
async fn automated(
    AuthAdmin(admin): AuthAdmin,
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
) -> AppResult<ApiResponse<WorkflowResult>> {
    info!(quiz_id = %quiz_id, admin_id = %admin.id, "Workflow run requested: automated");
    let result = state
        .workflow_orchestrator
        .run_automated(&admin, &quiz_id, &state.shutdown)
        .await?;

    Ok(ApiResponse::ok(result))
}

/// Current stage summary without running anything.
async fn status(
    AuthAdmin(admin): AuthAdmin,
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
) -> AppResult<ApiResponse<WorkflowResult>> {
    let result = state.workflow_orchestrator.status(&admin, &quiz_id).await?;

    Ok(ApiResponse::ok(result))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{quiz_id}", get(status))
        .route("/{quiz_id}/complete", post(complete))
        .route("/{quiz_id}/scoring", post(scoring))
        .route("/{quiz_id}/automated", post(automated))
}
