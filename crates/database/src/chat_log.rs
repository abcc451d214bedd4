//! Session store: per-user, per-conversation message logs.

use brain_core::{ChatMessage, Role};
use sqlx::{Sqlite, SqlitePool};

use crate::models::{Conversation, SessionSummary};
use crate::Result;

/// Generate a new conversation id: 8 characters of a v4 UUID.
pub fn new_session_id() -> String {
    let mut id = uuid::Uuid::new_v4().to_string();
    id.truncate(8);
    id
}

/// Load the messages of one conversation. Unknown conversations are empty.
pub async fn get_messages(
    pool: &SqlitePool,
    user_id: &str,
    session_id: &str,
) -> Result<Vec<ChatMessage>> {
    Ok(get_conversation(pool, user_id, session_id)
        .await?
        .map(|c| c.messages)
        .unwrap_or_default())
}

/// Load one conversation with its metadata.
pub async fn get_conversation(
    pool: &SqlitePool,
    user_id: &str,
    session_id: &str,
) -> Result<Option<Conversation>> {
    let row = sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT messages, updated_at
        FROM chat_logs
        WHERE user_id = ? AND session_id = ?
        "#,
    )
    .bind(user_id)
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    let Some((messages, updated_at)) = row else {
        return Ok(None);
    };

    Ok(Some(Conversation {
        user_id: user_id.to_string(),
        session_id: session_id.to_string(),
        messages: serde_json::from_str(&messages)?,
        updated_at,
    }))
}

/// Create or replace the message list of a conversation.
pub async fn save_messages(
    pool: &SqlitePool,
    user_id: &str,
    session_id: &str,
    messages: &[ChatMessage],
) -> Result<()> {
    upsert(pool, user_id, session_id, messages).await?;

    tracing::debug!(
        user_id = %user_id,
        session_id = %session_id,
        messages = messages.len(),
        "Saved chat log"
    );

    Ok(())
}

/// Append `turn` to a conversation, creating it if needed, and return the
/// full list.
///
/// The read and the write share one transaction, so messages appended by a
/// concurrent request are kept rather than overwritten.
pub async fn append_messages(
    pool: &SqlitePool,
    user_id: &str,
    session_id: &str,
    turn: &[ChatMessage],
) -> Result<Vec<ChatMessage>> {
    let mut tx = pool.begin().await?;

    let stored = sqlx::query_scalar::<_, String>(
        r#"
        SELECT messages
        FROM chat_logs
        WHERE user_id = ? AND session_id = ?
        "#,
    )
    .bind(user_id)
    .bind(session_id)
    .fetch_optional(&mut *tx)
    .await?;

    let mut messages: Vec<ChatMessage> = match stored {
        Some(raw) => serde_json::from_str(&raw)?,
        None => Vec::new(),
    };
    messages.extend_from_slice(turn);

    upsert(&mut *tx, user_id, session_id, &messages).await?;
    tx.commit().await?;

    tracing::debug!(
        user_id = %user_id,
        session_id = %session_id,
        appended = turn.len(),
        messages = messages.len(),
        "Appended to chat log"
    );

    Ok(messages)
}

async fn upsert<'e, E>(
    executor: E,
    user_id: &str,
    session_id: &str,
    messages: &[ChatMessage],
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let encoded = serde_json::to_string(messages)?;

    sqlx::query(
        r#"
        INSERT INTO chat_logs (user_id, session_id, messages, updated_at)
        VALUES (?, ?, ?, strftime('%Y-%m-%d %H:%M:%f', 'now'))
        ON CONFLICT(user_id, session_id) DO UPDATE SET
            messages = excluded.messages,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(session_id)
    .bind(encoded)
    .execute(executor)
    .await?;

    Ok(())
}

/// List a user's conversations, most recently updated first.
pub async fn list_sessions(pool: &SqlitePool, user_id: &str) -> Result<Vec<SessionSummary>> {
    let sessions = sqlx::query_as::<_, SessionSummary>(
        r#"
        SELECT session_id, updated_at
        FROM chat_logs
        WHERE user_id = ?
        ORDER BY updated_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(sessions)
}

/// Every user-authored message across a user's conversations, oldest
/// conversation first.
pub async fn user_messages(pool: &SqlitePool, user_id: &str) -> Result<Vec<ChatMessage>> {
    let rows = sqlx::query_scalar::<_, String>(
        r#"
        SELECT messages
        FROM chat_logs
        WHERE user_id = ?
        ORDER BY updated_at
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut collected = Vec::new();
    for raw in rows {
        let messages: Vec<ChatMessage> = serde_json::from_str(&raw)?;
        collected.extend(messages.into_iter().filter(|m| m.role == Role::User));
    }

    Ok(collected)
}
