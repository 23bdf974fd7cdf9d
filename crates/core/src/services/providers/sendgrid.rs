//! SendGrid v3 mail API.

use async_trait::async_trait;
use quizflow_common::AppResult;
use serde_json::json;
use std::time::Duration;

use super::{Sender, http_client};
use crate::services::email::{
    MailTransport, OutgoingEmail, SendError, error_from_request, error_from_response,
};

const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com";

/// Sends through `POST /v3/mail/send`; success is `202 Accepted`.
#[derive(Clone)]
pub struct SendGridProvider {
    client: reqwest::Client,
    api_key: String,
    sender: Sender,
    base_url: String,
}

impl SendGridProvider {
    /// Create a SendGrid adapter.
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
            "personalizations": [{
                "to": [{"email": email.to_email, "name": email.to_name}]
            }],
            "from": {
                "email": self.sender.email,
                "name": self.sender.name
            },
            "subject": email.subject,
            "content": [
                {"type": "text/html", "value": email.html_body}
            ]
        })
    }
}

#[async_trait]
impl MailTransport for SendGridProvider {
    fn name(&self) -> &str {
        "sendgrid"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), SendError> {
        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.payload(email))
            .send()
            .await
            .map_err(|e| error_from_request(self.name(), &e))?;

        if response.status().is_success() {
            let message_id = response
                .headers()
                .get("X-Message-Id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            tracing::debug!(to = %email.to_email, message_id, "SendGrid accepted message");
            Ok(())
        } else {
            Err(error_from_response(self.name(), response).await)
        }
    }
}
