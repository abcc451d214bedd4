//! SQLite persistence layer for AutoBot.
//!
//! This crate provides async database operations for accounts, chat logs and
//! read-only listings queries using SQLx with SQLite.
//!
//! # Example
//!
//! ```no_run
//! use database::{chat_log, user, Database, Identity};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:autobot.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     // Register, then store a conversation under the new identity
//!     let account = user::register(db.pool(), "alice", "hunter2").await?;
//!     let identity = Identity::registered(&account);
//!     let session_id = chat_log::new_session_id();
//!     chat_log::save_messages(db.pool(), &identity.user_id, &session_id, &[]).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod chat_log;
pub mod error;
pub mod listing;
pub mod models;
pub mod user;
pub mod validation;

pub use error::{DatabaseError, Result};
pub use listing::ListingStore;
pub use models::{
    Conversation, Identity, ListingFilter, QueryResult, SessionSummary, User,
};
pub use validation::ValidationError;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Default pool size for database connections.
    const DEFAULT_POOL_SIZE: u32 = 10;

    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    /// Use `?mode=rwc` to create the database file if it doesn't exist.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example() -> database::Result<()> {
    /// // File database
    /// let db = database::Database::connect("sqlite:data/autobot.db?mode=rwc").await?;
    ///
    /// // In-memory database (for testing)
    /// let db = database::Database::connect("sqlite::memory:").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect to a SQLite database with a custom pool size.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(
            "Connected to database: {} (pool size: {})",
            url,
            pool_size
        );

        Ok(Self { pool })
    }

    /// Run database migrations.
    ///
    /// Creates the `users` and `chat_logs` tables. The listings table is not
    /// managed here.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Listings access sharing this database's pool.
    pub fn listings(&self, table: &str) -> Result<ListingStore> {
        ListingStore::new(self.pool.clone(), table)
    }
}
