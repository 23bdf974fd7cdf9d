//! Mail dispatch contract.
//!
//! Core services hand batches of [`DispatchJob`]s to a [`MailDispatch`]
//! without depending on how sends are retried, throttled or routed across
//! providers. The implementation lives in the queue crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::cancel::CancelSignal;
use super::email::OutgoingEmail;

/// One email to deliver, correlated back to its owner by `id`.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    /// Owner id (invitation id or result id).
    pub id: String,
    /// The message.
    pub email: OutgoingEmail,
    /// Attempts made so far across all providers.
    pub attempt: u32,
    /// Most recent failure.
    pub last_error: Option<String>,
}

impl DispatchJob {
    /// A job that has not been attempted yet.
    #[must_use]
    pub fn new(id: impl Into<String>, email: OutgoingEmail) -> Self {
        Self {
            id: id.into(),
            email,
            attempt: 0,
            last_error: None,
        }
    }
}

/// Terminal state of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Accepted by a provider.
    Delivered { provider: String },
    /// Every provider exhausted, or a permanent rejection.
    Failed { error: String, permanent: bool },
    /// Never started because the batch was cancelled.
    Abandoned,
}

/// Per-recipient result of a dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub job_id: String,
    pub recipient: String,
    #[serde(flatten)]
    pub status: DispatchStatus,
    pub attempts: u32,
    pub at: DateTime<Utc>,
}

impl DispatchOutcome {
    /// Whether the message reached a provider.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self.status, DispatchStatus::Delivered { .. })
    }

    /// Failure reason, if the job failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            DispatchStatus::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Sends batches of mail.
///
/// Implementations return exactly one outcome per job, in any order.
#[async_trait]
pub trait MailDispatch: Send + Sync {
    /// Deliver a batch, stopping new sends once `cancel` fires.
    async fn dispatch(&self, jobs: Vec<DispatchJob>, cancel: &CancelSignal)
    -> Vec<DispatchOutcome>;
}

/// Type alias for a shared dispatcher.
pub type DispatchService = Arc<dyn MailDispatch>;
