//! Credential store: registration, login and anonymous identities.

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::User;
use crate::validation::{normalize_username, validate_password, validate_username};

/// Prefix of generated anonymous user ids.
pub const ANONYMOUS_PREFIX: &str = "anon-";

/// Hash a password as lowercase hex SHA-256.
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Generate an anonymous user id: `anon-` plus 12 characters of a v4 UUID.
pub fn anonymous_id() -> String {
    let uuid = uuid::Uuid::new_v4().to_string();
    format!("{}{}", ANONYMOUS_PREFIX, &uuid[..12])
}

/// Whether a chat-log user id belongs to an anonymous visitor.
pub fn is_anonymous_id(user_id: &str) -> bool {
    user_id.starts_with(ANONYMOUS_PREFIX)
}

/// Register a new account.
///
/// The username is normalised first. A taken username yields
/// [`DatabaseError::AlreadyExists`] and nothing is written.
pub async fn register(pool: &SqlitePool, username: &str, password: &str) -> Result<User> {
    let username = normalize_username(username);
    validate_username(&username)?;
    validate_password(password)?;

    let password_hash = hash_password(password);

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password)
        VALUES (?, ?)
        "#,
    )
    .bind(&username)
    .bind(&password_hash)
    .execute(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists {
                    entity: "User",
                    id: username.clone(),
                };
            }
        }
        DatabaseError::Sqlx(e)
    })?;

    tracing::info!(username = %username, "Registered user");

    Ok(User {
        user_id: result.last_insert_rowid(),
        username,
        password_hash,
    })
}

/// Check a username/password pair.
///
/// Unknown usernames and wrong passwords both yield
/// [`DatabaseError::InvalidCredentials`].
pub async fn authenticate(pool: &SqlitePool, username: &str, password: &str) -> Result<User> {
    let username = normalize_username(username);
    if username.is_empty() || password.is_empty() {
        return Err(DatabaseError::InvalidCredentials);
    }

    let candidate = hash_password(password);

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT user_id, username, password
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(&username)
    .fetch_optional(pool)
    .await?;

    match user {
        Some(user) if user.password_hash == candidate => Ok(user),
        _ => {
            tracing::debug!("Rejected login attempt");
            Err(DatabaseError::InvalidCredentials)
        }
    }
}

/// Get a user by ID.
pub async fn get_user(pool: &SqlitePool, user_id: i64) -> Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT user_id, username, password
        FROM users
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "User",
        id: user_id.to_string(),
    })
}

/// Count registered users.
pub async fn count_users(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM users
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(count)
}
