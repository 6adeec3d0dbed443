//! # Error Handling
//!
//! This module defines the error type returned by HTTP handlers and how it is
//! turned into a response.
//!
//! ## Error Categories:
//! - **Input errors** (missing file, empty filename, bad form value): 400
//! - **Oversized uploads**: 413
//! - **Unknown jobs or missing artifacts**: 404
//! - **Everything else**: 500 with a generic message
//!
//! Processing failures inside a job are not `AppError`s; they are stored on the
//! job record and reported through the status endpoint.
//!
//! ## JSON Response Format:
//! ```json
//! {
//!   "error": {
//!     "type": "not_found",
//!     "message": "Job 5f0c... not found",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_multipart::MultipartError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use tracing::error;

/// Message sent to clients for server-side failures.
const INTERNAL_MESSAGE: &str = "An internal error occurred";

/// Custom error types for the application.
///
/// ## Usage Example:
/// ```rust
/// return Err(AppError::BadRequest("No file part in the request".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Server-side failure; details are logged, never returned
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested job or file does not exist
    NotFound(String),

    /// Upload exceeded the configured size limit
    PayloadTooLarge(String),

    /// A form field failed validation
    ValidationError(String),
}

impl AppError {
    fn kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        }
    }

    /// The message that is safe to show a client.
    fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => INTERNAL_MESSAGE.to_string(),
            AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::ValidationError(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

/// Converts errors into JSON HTTP responses.
///
/// Internal errors are logged here with their full detail and answered with
/// [`INTERNAL_MESSAGE`], so paths and OS errors stay on the server.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.kind().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, error_type) = self.kind();
        if status.is_server_error() {
            error!(error = %self, "Request failed with an internal error");
        }

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": self.public_message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// `?` on an anyhow error inside a handler becomes a 500.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Malformed multipart bodies are the client's fault.
impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(format!("Malformed multipart body: {}", err))
    }
}

/// A blocking task that panicked or was cancelled.
impl From<actix_web::error::BlockingError> for AppError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_json(err: AppError) -> serde_json::Value {
        let response = err.error_response();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_web::test]
    async fn test_internal_details_are_hidden() {
        let err = AppError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "/srv/uploads/secret: permission denied",
        ));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(err).await;
        assert_eq!(body["error"]["type"], "internal_error");
        assert_eq!(body["error"]["message"], INTERNAL_MESSAGE);
    }

    #[actix_web::test]
    async fn test_client_errors_keep_message() {
        let err = AppError::NotFound("Job abc not found".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let body = body_json(err).await;
        assert_eq!(body["error"]["message"], "Job abc not found");

        let err = AppError::PayloadTooLarge("Upload exceeds 1 MB".to_string());
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[actix_web::test]
    async fn test_error_kinds() {
        let cases = [
            (AppError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            (AppError::BadRequest("No file part in the request".into()), StatusCode::BAD_REQUEST, "bad_request"),
            (AppError::NotFound("gone".into()), StatusCode::NOT_FOUND, "not_found"),
            (AppError::PayloadTooLarge("big".into()), StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            (AppError::ValidationError("bad format".into()), StatusCode::BAD_REQUEST, "validation_error"),
        ];

        for (err, status, error_type) in cases {
            assert_eq!(err.status_code(), status);
            assert_eq!(body_json(err).await["error"]["type"], error_type);
        }

        let err = AppError::from(anyhow::anyhow!("disk full").context("writing captions"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(err).await["error"]["message"], INTERNAL_MESSAGE);
    }
}
