//! Error types for quizflow.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // === Invitation Errors ===
    #[error("Active invitation already exists for student {student_id} on quiz {quiz_id}")]
    DuplicateActiveInvitation { quiz_id: String, student_id: String },

    #[error("Invitation already used: {0}")]
    AlreadyUsed(String),

    #[error("Invitation superseded: {0}")]
    Superseded(String),

    // === Workflow Errors ===
    #[error("Invalid question at index {index}: {reason}")]
    InvalidQuestionStructure { index: usize, reason: String },

    #[error("Stage {stage} already failed: {error}")]
    StageAlreadyFailed { stage: String, error: String },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    // === Dispatch Errors ===
    #[error("Transient send failure: {0}")]
    SendTransient(String),

    #[error("Permanent send failure: {0}")]
    SendPermanent(String),

    // === Server Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_)
            | Self::DuplicateActiveInvitation { .. }
            | Self::AlreadyUsed(_)
            | Self::StageAlreadyFailed { .. } => StatusCode::CONFLICT,
            Self::Superseded(_) => StatusCode::GONE,

            // 5xx Server Errors
            Self::InvalidQuestionStructure { .. }
            | Self::SendPermanent(_)
            | Self::ExternalService(_) => StatusCode::BAD_GATEWAY,
            Self::SendTransient(_) | Self::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::DuplicateActiveInvitation { .. } => "DUPLICATE_ACTIVE_INVITATION",
            Self::AlreadyUsed(_) => "ALREADY_USED",
            Self::Superseded(_) => "SUPERSEDED",
            Self::InvalidQuestionStructure { .. } => "INVALID_QUESTION_STRUCTURE",
            Self::StageAlreadyFailed { .. } => "STAGE_ALREADY_FAILED",
            Self::Cancelled(_) => "CANCELLED",
            Self::SendTransient(_) => "SEND_TRANSIENT",
            Self::SendPermanent(_) => "SEND_PERMANENT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
