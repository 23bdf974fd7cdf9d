//! Brevo (Sendinblue) transactional email API.

use async_trait::async_trait;
use quizflow_common::AppResult;
use serde_json::json;
use std::time::Duration;

use super::{Sender, http_client};
use crate::services::email::{
    MailTransport, OutgoingEmail, SendError, error_from_request, error_from_response,
};

const DEFAULT_BASE_URL: &str = "https://api.brevo.com";

/// Sends through `POST /v3/smtp/email`.
#[derive(Clone)]
pub struct BrevoProvider {
    client: reqwest::Client,
    api_key: String,
    sender: Sender,
    base_url: String,
}

impl BrevoProvider {
    /// Create a Brevo adapter.
    pub fn new(api_key: impl Into<String>, sender: Sender, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
            sender,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point at a different API host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn payload(&self, email: &OutgoingEmail) -> serde_json::Value {
        json!({
            "sender": {"name": self.sender.name, "email": self.sender.email},
            "to": [{"email": email.to_email, "name": email.to_name}],
            "subject": email.subject,
            "htmlContent": email.html_body,
        })
    }
}

#[async_trait]
impl MailTransport for BrevoProvider {
    fn name(&self) -> &str {
        "brevo"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), SendError> {
        let response = self
            .client
            .post(format!("{}/v3/smtp/email", self.base_url.trim_end_matches('/')))
            .header("api-key", &self.api_key)
            .header("accept", "application/json")
            .json(&self.payload(email))
            .send()
            .await
            .map_err(|e| error_from_request(self.name(), &e))?;

        if response.status().is_success() {
            tracing::debug!(to = %email.to_email, "Brevo accepted message");
            Ok(())
        } else {
            Err(error_from_response(self.name(), response).await)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let provider = BrevoProvider::new(
            "key",
            Sender::new("quiz@example.com", "Quizflow"),
            Duration::from_secs(5),
        )
        .unwrap();
        let payload = provider.payload(&OutgoingEmail {
            to_email: "ada@example.com".to_string(),
            to_name: "Ada".to_string(),
            subject: "Hi".to_string(),
            html_body: "<p>Hi</p>".to_string(),
        });

        assert_eq!(payload["sender"]["email"], "quiz@example.com");
        assert_eq!(payload["to"][0]["name"], "Ada");
        assert_eq!(payload["htmlContent"], "<p>Hi</p>");
    }
}
