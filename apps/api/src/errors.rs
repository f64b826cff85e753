use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::interview::InterviewError;
use crate::llm_client::LlmError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The turn failed after all retries; the session is intact and the
    /// same request may be sent again.
    #[error("Generation exhausted: {0}")]
    GenerationExhausted(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<InterviewError> for AppError {
    fn from(err: InterviewError) -> Self {
        match err {
            InterviewError::Generation(LlmError::Exhausted { .. }) | InterviewError::EmptyQuestion => {
                AppError::GenerationExhausted(err.to_string())
            }
            InterviewError::Generation(LlmError::Configuration(msg)) => AppError::Configuration(msg),
            InterviewError::Generation(e @ LlmError::InvalidRequest(_)) => {
                AppError::Internal(anyhow::anyhow!(e))
            }
            InterviewError::NotStarted => AppError::Validation(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::GenerationExhausted(msg) => {
                tracing::warn!("Generation exhausted: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "GENERATION_EXHAUSTED",
                    "The question service is busy. Please submit your answer again.".to_string(),
                )
            }
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    "The interview service is not configured correctly".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
