//! Per-quiz admin endpoints.

use axum::{
    Router,
    extract::{Path, State},
    routing::get,
};
use quizflow_common::AppResult;

use super::invitations::InvitationResponse;
use crate::{extractors::AuthAdmin, middleware::AppState, response::ApiResponse};

/// List the invitations of one quiz.
async fn invitations(
    AuthAdmin(admin): AuthAdmin,
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
) -> AppResult<ApiResponse<Vec<InvitationResponse>>> {
    let invitations = state
        .invitation_service
        .list_by_quiz(&admin, &quiz_id)
        .await?;

    Ok(ApiResponse::ok(
        invitations.into_iter().map(Into::into).collect(),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{quiz_id}/invitations", get(invitations))
}
