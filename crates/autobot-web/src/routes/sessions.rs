//! Conversation picker.

use askama::Template;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Form;
use database::chat_log;
use serde::Deserialize;
use tracing::info;

use super::{current_session, redirect};
use crate::error::Result;
use crate::state::AppState;

/// Conversation picker page.
#[derive(Template)]
#[template(path = "sessions.html")]
pub struct SessionsTemplate {
    pub display_name: String,
    pub user_id: String,
    pub anonymous: bool,
    pub sessions: Vec<SessionRow>,
    pub flash: Option<String>,
}

/// One past conversation.
pub struct SessionRow {
    pub session_id: String,
    pub updated_at: String,
}

#[derive(Deserialize)]
pub struct OpenForm {
    pub session_id: String,
}

/// List the user's conversations, newest first.
pub async fn sessions_page(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let Some((id, browser)) = current_session(&state, &headers).await else {
        return Ok(redirect("/login"));
    };
    let Some(identity) = browser.identity else {
        return Ok(redirect("/login"));
    };

    let sessions = chat_log::list_sessions(state.db.pool(), &identity.user_id)
        .await?
        .into_iter()
        .map(|s| SessionRow {
            updated_at: s.updated_at_display().to_string(),
            session_id: s.session_id,
        })
        .collect();

    let flash = state.sessions.update(&id, |s| s.flash.take()).await.flatten();

    Ok(SessionsTemplate {
        display_name: identity.display_name,
        user_id: identity.user_id,
        anonymous: identity.anonymous,
        sessions,
        flash,
    }
    .into_response())
}

/// Start a new conversation.
pub async fn new_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some((id, _)) = current_session(&state, &headers).await else {
        return redirect("/login");
    };

    let session_id = chat_log::new_session_id();
    info!(session_id = %session_id, "New conversation");
    state
        .sessions
        .update(&id, |s| s.open_conversation(session_id))
        .await;

    redirect("/chat")
}

/// Reopen one of the user's conversations.
pub async fn open_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<OpenForm>,
) -> Result<Response> {
    let Some((id, browser)) = current_session(&state, &headers).await else {
        return Ok(redirect("/login"));
    };
    let Some(identity) = browser.identity else {
        return Ok(redirect("/login"));
    };

    let exists = chat_log::get_conversation(state.db.pool(), &identity.user_id, &form.session_id)
        .await?
        .is_some();

    if !exists {
        state
            .sessions
            .update(&id, |s| s.flash = Some("Conversation not found.".to_string()))
            .await;
        return Ok(redirect("/sessions"));
    }

    state
        .sessions
        .update(&id, |s| s.open_conversation(form.session_id))
        .await;

    Ok(redirect("/chat"))
}
