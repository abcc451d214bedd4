//! Error types for the web interface.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Errors that end a request with an error page.
///
/// Expected failures (bad credentials, untranslatable queries, empty
/// results) are shown inline on the page instead and never reach here.
#[derive(Debug, Error)]
pub enum WebError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] database::DatabaseError),

    /// Malformed upload.
    #[error("Upload error: {0}")]
    Upload(#[from] MultipartError),

    /// Bad form input.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebError::Database(err) => {
                tracing::error!("Database error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            WebError::Upload(err) => {
                tracing::warn!("Upload error: {}", err);
                (err.status(), err.body_text())
            }
            WebError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            WebError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

/// Result type for web handlers.
pub type Result<T> = std::result::Result<T, WebError>;
