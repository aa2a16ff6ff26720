//! Error response formatting
//!
//! Standard JSON envelope for the endpoints that report failures as
//! structured errors, with status codes derived from `AppError`.

use crate::error::{AppError, ErrorCode};
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::logging::REQUEST_ID_HEADER;

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub error: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Request ID for debugging and support
    pub request_id: Option<String>,

    /// ISO 8601 timestamp of the error
    pub timestamp: String,

    /// Whether the client should retry the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            retryable: Some(error.is_retryable()),
        }
    }
}

/// Status code of an `AppError` as an axum `StatusCode`
pub fn status_of(error: &AppError) -> StatusCode {
    StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Logs at `error` for 5xx and `warn` for 4xx.
pub fn log_app_error(error: &AppError) {
    let status = status_of(error);
    if status.is_server_error() {
        tracing::error!(
            error = %error,
            request_id = ?error.request_id,
            status = %status.as_u16(),
            "Server error occurred"
        );
    } else {
        tracing::warn!(
            error = %error,
            request_id = ?error.request_id,
            status = %status.as_u16(),
            "Client error occurred"
        );
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        log_app_error(&self);
        let status_code = status_of(&self);
        (status_code, Json(ErrorResponse::from_app_error(&self))).into_response()
    }
}

pub fn get_request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
