//! Error types for model calls.

use thiserror::Error;

/// Errors that can occur while talking to a model backend.
#[derive(Debug, Error)]
pub enum BrainError {
    /// The backend is misconfigured (missing key, bad URL, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request never reached the backend.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with an error or an unreadable body.
    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    /// The backend answered but produced no text.
    #[error("model returned an empty response")]
    EmptyResponse,

    /// The backend is temporarily unavailable.
    #[error("brain unavailable: {0}")]
    Unavailable(String),
}
