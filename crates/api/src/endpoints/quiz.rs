//! Token-gated student endpoints.
//!
//! No authentication: possession of the token is the grant.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use quizflow_common::AppResult;
use quizflow_core::StudentQuizView;
use quizflow_db::models::SubmittedAnswer;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{middleware::AppState, response::ApiResponse};

// ==================== Request/Response Types ====================

/// One answer.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub question_order: u32,
    #[validate(length(max = 1000))]
    pub answer: String,
}

/// Submit answers request.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    #[validate(length(min = 1), nested)]
    pub answers: Vec<AnswerRequest>,
}

/// Accepted submission.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub invitation_id: String,
    pub answered: usize,
    pub completed_at: String,
}

// ==================== Handlers ====================

/// Show the quiz behind a token, without correct answers.
async fn show(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<ApiResponse<StudentQuizView>> {
    let view = state.invitation_service.student_view(&token).await?;

    Ok(ApiResponse::ok(view))
}

/// Redeem the token with a set of answers. Succeeds once per token.
async fn submit(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> AppResult<ApiResponse<SubmissionResponse>> {
    req.validate()?;

    let answers = req
        .answers
        .into_iter()
        .map(|a| SubmittedAnswer {
            question_order: a.question_order,
            answer: a.answer,
        })
        .collect();
    let set = state.invitation_service.submit(&token, answers).await?;

    Ok(ApiResponse::ok(SubmissionResponse {
        invitation_id: set.invitation_id,
        answered: set.answers.len(),
        completed_at: set.completed_at.to_rfc3339(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{token}", get(show))
        .route("/{token}/submit", post(submit))
}
