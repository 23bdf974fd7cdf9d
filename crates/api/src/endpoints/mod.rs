//! API endpoints.

mod health;
mod invitations;
mod quiz;
mod quizzes;
mod workflows;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/workflows", workflows::router())
        .nest("/quizzes", quizzes::router())
        .nest("/invitations", invitations::router())
        .nest("/quiz", quiz::router())
}
