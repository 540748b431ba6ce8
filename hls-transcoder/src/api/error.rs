//! API error handling.
//!
//! Provides consistent error responses for the API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;
use crate::probe::ProbeError;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 400 for a missing or unknown live channel.
    pub fn connection_not_found(channel_id: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "CONNECTION_NOT_FOUND",
            "Socket connection not found.",
        )
        .with_details(serde_json::json!({ "socketId": channel_id }))
    }

    /// 404 for a missing source file.
    pub fn file_not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "FILE_NOT_FOUND", message)
    }

    /// 422 Unprocessable Entity.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    /// 500 for an inspector failure.
    pub fn probe_failed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "PROBE_FAILED", message)
    }

    /// 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::ConnectionNotFound(id) => ApiError::connection_not_found(&id),
            Error::SourceNotFound(path) | Error::Probe(ProbeError::NotFound(path)) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                ApiError::file_not_found(format!("File not found: {name}"))
            }
            Error::Probe(e) => {
                tracing::error!("Probe failed: {}", e);
                ApiError::probe_failed(e.to_string())
            }
            Error::Validation(msg) => ApiError::validation(msg),
            Error::Io(e) => {
                tracing::error!("IO error: {}", e);
                ApiError::internal("IO error occurred")
            }
            Error::IoPath { .. } => {
                tracing::error!("IO error: {}", err);
                ApiError::internal("IO error occurred")
            }
            Error::ApiError(msg) => ApiError::bad_request(msg),
            _ => {
                tracing::error!("Unexpected error: {}", err);
                ApiError::internal("An unexpected error occurred")
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn connection_not_found_is_400_with_socket_id() {
        let api_err: ApiError = Error::connection_not_found("abc").into();

        assert_eq!(api_err.status, StatusCode::BAD_REQUEST);
        assert_eq!(api_err.code, "CONNECTION_NOT_FOUND");
        assert_eq!(api_err.message, "Socket connection not found.");
        assert_eq!(api_err.details.unwrap()["socketId"], "abc");
    }

    #[test]
    fn missing_files_are_404() {
        let from_submit: ApiError = Error::SourceNotFound(PathBuf::from("uploads/a.mp4")).into();
        let from_probe: ApiError =
            Error::Probe(ProbeError::NotFound(PathBuf::from("uploads/b.mp4"))).into();

        for (err, name) in [(from_submit, "a.mp4"), (from_probe, "b.mp4")] {
            assert_eq!(err.status, StatusCode::NOT_FOUND);
            assert_eq!(err.code, "FILE_NOT_FOUND");
            assert!(err.message.contains(name));
        }
    }

    #[test]
    fn probe_failure_is_500() {
        let err: ApiError = Error::Probe(ProbeError::Failed {
            status: Some(1),
            stderr: "Invalid data".into(),
        })
        .into();

        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "PROBE_FAILED");
    }

    #[test]
    fn validation_is_422() {
        let err: ApiError = Error::validation("bad name").into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn internal_errors_hide_details() {
        let err: ApiError = Error::Io(std::io::Error::other("disk on fire")).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("disk"));
    }
}
