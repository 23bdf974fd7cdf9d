//! Mail transport abstraction shared by every provider adapter.

use async_trait::async_trait;
use quizflow_common::AppError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single rendered email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    /// Recipient address.
    pub to_email: String,
    /// Recipient display name.
    pub to_name: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html_body: String,
}

/// Whether retrying can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendErrorKind {
    /// Network trouble, throttling, provider outage or credential problem.
    Transient,
    /// The message itself was rejected (bad address, refused content).
    Permanent,
}

/// Failure reported by a provider adapter.
#[derive(Debug, Clone, Error)]
#[error("{provider}: {message}")]
pub struct SendError {
    /// Retry classification.
    pub kind: SendErrorKind,
    /// Provider name.
    pub provider: String,
    /// Provider detail.
    pub message: String,
}

impl SendError {
    /// A failure worth retrying.
    #[must_use]
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: SendErrorKind::Transient,
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// A failure no provider can fix.
    #[must_use]
    pub fn permanent(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: SendErrorKind::Permanent,
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether a retry may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == SendErrorKind::Transient
    }
}

impl From<SendError> for AppError {
    fn from(err: SendError) -> Self {
        match err.kind {
            SendErrorKind::Transient => Self::SendTransient(err.to_string()),
            SendErrorKind::Permanent => Self::SendPermanent(err.to_string()),
        }
    }
}

/// One email provider.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Provider name used in logs and outcomes.
    fn name(&self) -> &str;

    /// Send one email.
    async fn send(&self, email: &OutgoingEmail) -> Result<(), SendError>;
}

/// Classify a non-success HTTP status from a mail API.
///
/// 401/403 count as transient: they point at this provider's credentials or
/// plan, which the next provider does not share.
#[must_use]
pub fn classify_status(status: StatusCode) -> SendErrorKind {
    match status.as_u16() {
        401 | 403 | 408 | 425 | 429 => SendErrorKind::Transient,
        400..=499 => SendErrorKind::Permanent,
        _ => SendErrorKind::Transient,
    }
}

/// Build the error for a failed HTTP response.
pub(crate) async fn error_from_response(provider: &str, response: reqwest::Response) -> SendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = format!("HTTP {status}: {}", body.chars().take(500).collect::<String>());
    match classify_status(status) {
        SendErrorKind::Transient => SendError::transient(provider, message),
        SendErrorKind::Permanent => SendError::permanent(provider, message),
    }
}

/// Transport-level reqwest failures (connect, timeout, TLS) are transient.
pub(crate) fn error_from_request(provider: &str, err: &reqwest::Error) -> SendError {
    if err.is_timeout() {
        SendError::transient(provider, format!("request timed out: {err}"))
    } else {
        SendError::transient(provider, format!("request failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), SendErrorKind::Permanent);
        assert_eq!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY),
            SendErrorKind::Permanent
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            SendErrorKind::Transient
        );
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), SendErrorKind::Transient);
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            SendErrorKind::Transient
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            SendErrorKind::Transient
        );
    }

    #[test]
    fn test_send_error_maps_to_app_error() {
        let err: AppError = SendError::permanent("brevo", "invalid email").into();
        assert!(matches!(err, AppError::SendPermanent(_)));

        let err: AppError = SendError::transient("smtp", "connection reset").into();
        assert!(matches!(err, AppError::SendTransient(_)));
    }
}
