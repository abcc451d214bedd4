//! Error types for the search pipeline.

use brain_core::BrainError;
use database::DatabaseError;
use thiserror::Error;

use crate::sanitizer::SanitizeError;

/// Errors that end a search turn.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The model call failed.
    #[error("Model error: {0}")]
    Brain(#[from] BrainError),

    /// The model's answer could not be turned into a safe statement.
    #[error("Translation error: {0}")]
    Sanitize(#[from] SanitizeError),

    /// Executing the statement failed.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// The query context holds no phrases.
    #[error("Nothing to search for")]
    EmptyQuery,

    /// The translate strategy was requested without a model.
    #[error("No language model configured")]
    NoModel,

    /// An upload that is not PNG or JPEG.
    #[error("Unsupported image type: {0}")]
    UnsupportedImage(String),
}

/// Result type for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// The failing statement, for execution faults.
    pub fn sql(&self) -> Option<&str> {
        match self {
            SearchError::Database(DatabaseError::Query { sql, .. }) => Some(sql),
            _ => None,
        }
    }
}
