//! Database models.

use brain_core::ChatMessage;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    /// Auto-incrementing ID.
    pub user_id: i64,
    /// Lower-cased, unique username.
    pub username: String,
    /// Hex SHA-256 of the password.
    #[serde(skip_serializing)]
    #[sqlx(rename = "password")]
    pub password_hash: String,
}

/// Who is chatting: a registered user or an anonymous visitor.
///
/// `user_id` is the key chat logs are stored under. For registered users it
/// is the numeric account id rendered as text; anonymous ids start with
/// `anon-` and are never written to the users table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub anonymous: bool,
}

impl Identity {
    /// Identity for a logged-in account.
    pub fn registered(user: &User) -> Self {
        Self {
            user_id: user.user_id.to_string(),
            display_name: user.username.clone(),
            anonymous: false,
        }
    }

    /// Identity for an anonymous visitor with the given generated id.
    pub fn anonymous(anon_id: impl Into<String>) -> Self {
        Self {
            user_id: anon_id.into(),
            display_name: "Anonymous".to_string(),
            anonymous: true,
        }
    }
}

/// A stored conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub user_id: String,
    pub session_id: String,
    /// Messages in order, oldest first.
    pub messages: Vec<ChatMessage>,
    pub updated_at: String,
}

/// A conversation listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SessionSummary {
    pub session_id: String,
    /// Last update timestamp (UTC, `YYYY-MM-DD HH:MM:SS.SSS`).
    pub updated_at: String,
}

impl SessionSummary {
    /// Timestamp trimmed to whole seconds, for display.
    pub fn updated_at_display(&self) -> &str {
        self.updated_at.split('.').next().unwrap_or(&self.updated_at)
    }
}

/// Tabular result of a listings query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names, in select order.
    pub columns: Vec<String>,
    /// Rows, each with one cell per column.
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Position of a column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Cell value by row index and column name.
    pub fn cell(&self, row: usize, column: &str) -> Option<&serde_json::Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }

    /// The first `n` rows rendered as JSON objects keyed by column.
    pub fn sample(&self, n: usize) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .take(n)
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// Structured filters for a parameterised listings search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilter {
    /// Partial, case-insensitive brand match.
    pub brand: Option<String>,
    /// Partial, case-insensitive model match.
    pub model: Option<String>,
    /// Inclusive price ceiling.
    pub max_price: Option<i64>,
    /// Inclusive mileage ceiling.
    pub max_mileage: Option<i64>,
    /// Inclusive lower bound on model year.
    pub min_year: Option<i64>,
}

impl ListingFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
