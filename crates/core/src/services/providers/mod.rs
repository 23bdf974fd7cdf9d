//! Provider adapters: one [`MailTransport`](super::email::MailTransport) per
//! email service.

mod brevo;
mod sendgrid;
mod smtp;

pub use brevo::BrevoProvider;
pub use sendgrid::SendGridProvider;
pub use smtp::SmtpProvider;

use quizflow_common::{AppError, AppResult};
use std::time::Duration;

/// Sender identity stamped on every message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub email: String,
    pub name: String,
}

impl Sender {
    /// Create a sender identity.
    #[must_use]
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
        }
    }
}

fn http_client(timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))
}
