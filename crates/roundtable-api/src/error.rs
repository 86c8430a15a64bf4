//! Roundtable API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use roundtable_core::error::CoordinationError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Tracing or exporter setup failed.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `CoordinationError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub CoordinationError);

impl From<CoordinationError> for ApiError {
    fn from(err: CoordinationError) -> Self {
        Self(err)
    }
}

/// Status code for each coordination error.
#[must_use]
pub fn status_for(err: &CoordinationError) -> StatusCode {
    match err {
        CoordinationError::SessionNotFound(_) | CoordinationError::TurnNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        CoordinationError::ParticipantNotMember { .. } => StatusCode::FORBIDDEN,
        CoordinationError::ParticipantAlreadyPresent { .. }
        | CoordinationError::SessionFull { .. }
        | CoordinationError::SessionNotJoinable { .. }
        | CoordinationError::SessionNotAcceptingResponses { .. }
        | CoordinationError::SessionNotPausable { .. }
        | CoordinationError::SessionNotResumable { .. }
        | CoordinationError::InvalidTransition { .. }
        | CoordinationError::StoreConflict { .. } => StatusCode::CONFLICT,
        CoordinationError::UnsupportedGameType(_) | CoordinationError::GuardRejected { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CoordinationError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "request failed on the store");
        }

        let body = ErrorBody {
            error: self.0.code(),
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
