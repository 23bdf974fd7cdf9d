//! HTTP API layer for quizflow.
//!
//! A thin JSON surface over the engine:
//!
//! - **Workflows**: trigger `complete`, `scoring` and `automated` runs, read status
//! - **Invitations**: admin listing, resend, reissue and delete
//! - **Quiz**: token-gated student view and answer submission
//!
//! Built on Axum 0.8. Admin identity comes from the upstream authenticator
//! via [`middleware::admin_identity`].

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
pub use middleware::AppState;
