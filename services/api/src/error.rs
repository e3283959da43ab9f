//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service, and how it is
//! turned into an HTTP response at the request boundary.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mock_exam_core::ports::PortError;
use serde_json::json;
use tracing::error;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("{0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents an error running the embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Port(PortError::BadRequest(message.into()))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Port(port) => port_status(port),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The text shown to the caller.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Port(PortError::BadRequest(message)) => message.clone(),
            ApiError::Port(PortError::Forbidden(message)) => message.clone(),
            ApiError::Port(PortError::NotFound(message)) => message.clone(),
            ApiError::Port(PortError::Unauthorized) => "Unauthorized".to_string(),
            other => other.to_string(),
        }
    }
}

/// Maps a port error kind onto the HTTP status used by synchronous endpoints.
///
/// Configuration and upstream failures carry their message back with a 400.
pub fn port_status(error: &PortError) -> StatusCode {
    match error {
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::Forbidden(_) => StatusCode::FORBIDDEN,
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::BadRequest(_)
        | PortError::Configuration(_)
        | PortError::MaterialFetch { .. }
        | PortError::NoAttachments
        | PortError::AttachmentUpload { .. }
        | PortError::EmptyGeneration(_)
        | PortError::Render(_)
        | PortError::Upstream(_)
        | PortError::Unexpected(_) => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() || status == StatusCode::BAD_REQUEST {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "message": self.user_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_kinds_map_to_statuses() {
        assert_eq!(port_status(&PortError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(port_status(&PortError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(port_status(&PortError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(port_status(&PortError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            port_status(&PortError::Configuration("set AI_PROVIDER".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(port_status(&PortError::Upstream("x".into())), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn bad_request_message_is_passed_through() {
        let err = ApiError::bad_request("Course title is required.");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.user_message(), "Course title is required.");
    }

    #[test]
    fn startup_errors_are_internal() {
        let err = ApiError::Internal("boom".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
