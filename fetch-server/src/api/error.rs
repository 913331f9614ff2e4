//! API error handling.
//!
//! Provides consistent error responses for the API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::error::Error;
use crate::pipeline::JobFailure;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
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
    /// Create a new API error.
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Create a 400 Bad Request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Create a 500 Internal Server Error.
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

/// Response code for a pipeline error.
fn error_code(err: &Error) -> &'static str {
    match err {
        Error::Validation(_) => "BAD_REQUEST",
        Error::Process { .. } => "PROCESS_ERROR",
        Error::NoArtifactsProduced { .. } => "NO_ARTIFACTS_PRODUCED",
        Error::Timeout { .. } => "TIMEOUT",
        Error::Mux { .. } => "MUX_ERROR",
        Error::Archive(_) => "ARCHIVE_ERROR",
        Error::Delivery(_) => "DELIVERY_ERROR",
        _ => "INTERNAL_ERROR",
    }
}

/// `(exit_code, stderr, fetch_stderr)` of errors that carry tool diagnostics.
fn tool_diagnostics(err: &Error) -> (Option<i32>, Option<&str>, Option<&str>) {
    match err {
        Error::Process {
            exit_code, stderr, ..
        } => (*exit_code, Some(stderr.as_str()), None),
        Error::Mux {
            exit_code,
            stderr,
            fetch_stderr,
        } => (*exit_code, Some(stderr.as_str()), Some(fetch_stderr.as_str())),
        _ => (None, None, None),
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::Validation(msg) => ApiError::bad_request(msg.clone()),
            Error::Process { .. } | Error::Mux { .. } => {
                let (exit_code, stderr, fetch_stderr) = tool_diagnostics(&err);
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_code(&err),
                    err.to_string(),
                )
                .with_details(json!({
                    "kind": err.kind(),
                    "exit_code": exit_code,
                    "stderr": stderr,
                    "fetch_stderr": fetch_stderr,
                }))
            }
            _ => {
                tracing::error!(kind = err.kind(), error = %err, "Request failed");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_code(&err),
                    err.to_string(),
                )
            }
        }
    }
}

impl From<JobFailure> for ApiError {
    fn from(failure: JobFailure) -> Self {
        let (exit_code, stderr, fetch_stderr) = tool_diagnostics(&failure.error);
        let details = json!({
            "job_id": failure.job_id,
            "shape": failure.shape,
            "stage": failure.stage,
            "kind": failure.error.kind(),
            "exit_code": exit_code,
            "stderr": stderr,
            "fetch_stderr": fetch_stderr,
            "directory": failure.directory,
        });
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_code(&failure.error),
            failure.error.to_string(),
        )
        .with_details(details)
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
