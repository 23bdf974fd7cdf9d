//! API middleware.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use quizflow_common::AdminIdentity;
use quizflow_core::{CancelSignal, InvitationService, WorkflowOrchestrator};

/// Header carrying the admin id, set by the authenticating proxy.
pub const ADMIN_ID_HEADER: &str = "X-Admin-Id";

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub invitation_service: InvitationService,
    pub workflow_orchestrator: WorkflowOrchestrator,
    /// Fires on server shutdown; handed to workflow runs.
    pub shutdown: CancelSignal,
}

/// Attach an [`AdminIdentity`] to the request when the admin header is present.
///
/// Requests without it pass through; admin endpoints reject them through the
/// [`AuthAdmin`](crate::extractors::AuthAdmin) extractor.
pub async fn admin_identity(mut req: Request<Body>, next: Next) -> Response {
    if let Some(value) = req.headers().get(ADMIN_ID_HEADER)
        && let Ok(id) = value.to_str()
        && !id.trim().is_empty()
    {
        let admin = AdminIdentity::new(id.trim());
        req.extensions_mut().insert(admin);
    }

    next.run(req).await
}
