//! Invitation admin endpoints.

use axum::{
    Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use quizflow_common::AppResult;
use quizflow_core::DispatchOutcome;
use quizflow_db::models::{Invitation, QuizSnapshot};
use serde::Serialize;

use crate::{extractors::AuthAdmin, middleware::AppState, response::ApiResponse};

// ==================== Request/Response Types ====================

/// Invitation response. The question snapshot is omitted; it holds answers.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationResponse {
    pub id: String,
    pub quiz_id: String,
    pub student_id: String,
    pub token: String,
    pub created_at: String,
    pub sent_at: Option<String>,
    pub is_used: bool,
    pub used_at: Option<String>,
    pub superseded_at: Option<String>,
    pub superseded_by: Option<String>,
    pub last_error: Option<String>,
    pub quiz_snapshot: QuizSnapshot,
    pub question_count: usize,
}

impl From<Invitation> for InvitationResponse {
    fn from(i: Invitation) -> Self {
        Self {
            question_count: i.questions_snapshot.len(),
            id: i.id,
            quiz_id: i.quiz_id,
            student_id: i.student_id,
            token: i.token,
            created_at: i.created_at.to_rfc3339(),
            sent_at: i.sent_at.map(|t| t.to_rfc3339()),
            is_used: i.is_used,
            used_at: i.used_at.map(|t| t.to_rfc3339()),
            superseded_at: i.superseded_at.map(|t| t.to_rfc3339()),
            superseded_by: i.superseded_by,
            last_error: i.last_error,
            quiz_snapshot: i.quiz_snapshot,
        }
    }
}

// ==================== Handlers ====================

/// List invitations across the admin's quizzes.
async fn list(
    AuthAdmin(admin): AuthAdmin,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<InvitationResponse>>> {
    let invitations = state.invitation_service.list_by_admin(&admin).await?;

    Ok(ApiResponse::ok(
        invitations.into_iter().map(Into::into).collect(),
    ))
}

/// Send the invitation email again with the same token.
async fn resend(
    AuthAdmin(admin): AuthAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<DispatchOutcome>> {
    let outcome = state.invitation_service.resend(&admin, &id).await?;

    Ok(ApiResponse::ok(outcome))
}

/// Retire the invitation and issue a new token.
async fn reissue(
    AuthAdmin(admin): AuthAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<InvitationResponse>> {
    let invitation = state.invitation_service.reissue(&admin, &id).await?;

    Ok(ApiResponse::created(invitation.into()))
}

/// Delete an invitation.
async fn remove(
    AuthAdmin(admin): AuthAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<()>> {
    state.invitation_service.delete(&admin, &id).await?;

    Ok(ApiResponse::ok(()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/{id}", delete(remove))
        .route("/{id}/resend", post(resend))
        .route("/{id}/reissue", post(reissue))
}
