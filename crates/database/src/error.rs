//! Database error types.

use thiserror::Error;

use crate::validation::ValidationError;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// SQLx error (connection, query, etc.)
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A listings statement failed; carries the statement for diagnosis.
    #[error("query failed: {source} (sql: {sql})")]
    Query {
        sql: String,
        #[source]
        source: sqlx::Error,
    },

    /// Stored JSON could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input rejected before reaching the database.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Record not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Record already exists
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// Unknown username or wrong password. Deliberately does not say which.
    #[error("invalid username or password")]
    InvalidCredentials,
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
