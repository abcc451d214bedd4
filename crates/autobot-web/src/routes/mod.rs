//! Route handlers for the web interface.

pub mod auth;
pub mod chat;
pub mod health;
pub mod sessions;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::session::{self, BrowserSession};
use crate::state::AppState;

/// Largest accepted image upload.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Build the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        // Login
        .route("/", get(auth::index))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", post(auth::register))
        .route("/anonymous", post(auth::anonymous))
        .route("/logout", post(auth::logout))
        // Conversation picker
        .route("/sessions", get(sessions::sessions_page))
        .route("/sessions/new", post(sessions::new_session))
        .route("/sessions/open", post(sessions::open_session))
        // Chat
        .route("/chat", get(chat::chat_page).post(chat::send_message))
        .route(
            "/chat/image",
            post(chat::upload_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/chat/reset", post(chat::reset))
        // Health check
        .route("/health", get(health::health))
}

/// The caller's session id and state, if logged in.
pub(crate) async fn current_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Option<(String, BrowserSession)> {
    let id = session::session_id(headers)?;
    let browser = state.sessions.get(&id).await?;
    browser.identity.is_some().then_some((id, browser))
}

pub(crate) fn redirect(to: &str) -> Response {
    Redirect::to(to).into_response()
}
