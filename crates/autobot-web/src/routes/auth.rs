//! Login, registration and anonymous access.

use askama::Template;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::Form;
use database::{user, DatabaseError, Identity};
use serde::Deserialize;
use tracing::info;

use super::{current_session, redirect};
use crate::error::Result;
use crate::session::{self, BrowserSession};
use crate::state::AppState;

/// Login / register / anonymous page.
#[derive(Template, Default)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub notice: Option<String>,
    pub username: String,
}

impl LoginTemplate {
    fn error(message: impl Into<String>, username: &str) -> Self {
        Self {
            error: Some(message.into()),
            username: username.trim().to_string(),
            ..Self::default()
        }
    }
}

/// Username and password form.
#[derive(Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl CredentialsForm {
    fn is_incomplete(&self) -> bool {
        self.username.trim().is_empty() || self.password.is_empty()
    }
}

/// Send visitors wherever they left off.
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Redirect {
    match current_session(&state, &headers).await {
        None => Redirect::to("/login"),
        Some((_, browser)) if browser.conversation.is_some() => Redirect::to("/chat"),
        Some(_) => Redirect::to("/sessions"),
    }
}

/// Render the login page.
pub async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if current_session(&state, &headers).await.is_some() {
        return redirect("/sessions");
    }
    LoginTemplate::default().into_response()
}

/// Check credentials and start a session.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<CredentialsForm>,
) -> Result<Response> {
    if form.is_incomplete() {
        return Ok(LoginTemplate::error("Fill all fields", &form.username).into_response());
    }

    match user::authenticate(state.db.pool(), &form.username, &form.password).await {
        Ok(account) => {
            info!(user_id = account.user_id, "User logged in");
            Ok(start_session(&state, &headers, Identity::registered(&account)).await)
        }
        Err(DatabaseError::InvalidCredentials) => Ok((
            StatusCode::UNAUTHORIZED,
            LoginTemplate::error("Invalid login.", &form.username),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// Create an account. The user logs in separately afterwards.
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> Result<Response> {
    if form.is_incomplete() {
        return Ok(LoginTemplate::error("Fill all fields", &form.username).into_response());
    }

    let page = match user::register(state.db.pool(), &form.username, &form.password).await {
        Ok(account) => LoginTemplate {
            notice: Some("Registered! Please log in.".to_string()),
            username: account.username,
            ..LoginTemplate::default()
        },
        Err(DatabaseError::AlreadyExists { .. }) => {
            LoginTemplate::error("Username already exists.", &form.username)
        }
        Err(DatabaseError::Validation(e)) => LoginTemplate::error(e.to_string(), &form.username),
        Err(e) => return Err(e.into()),
    };

    Ok(page.into_response())
}

/// Continue without an account.
pub async fn anonymous(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let identity = Identity::anonymous(user::anonymous_id());
    info!(user_id = %identity.user_id, "Anonymous session started");
    start_session(&state, &headers, identity).await
}

/// End the session.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = session::session_id(&headers) {
        state.sessions.remove(&id).await;
    }
    (
        AppendHeaders([(SET_COOKIE, session::expired_cookie())]),
        Redirect::to("/login"),
    )
        .into_response()
}

/// Replace any existing session with a fresh one for `identity`.
async fn start_session(state: &AppState, headers: &HeaderMap, identity: Identity) -> Response {
    if let Some(old) = session::session_id(headers) {
        state.sessions.remove(&old).await;
    }
    let id = state.sessions.create(BrowserSession::logged_in(identity)).await;

    (
        AppendHeaders([(SET_COOKIE, session::session_cookie(&id))]),
        Redirect::to("/sessions"),
    )
        .into_response()
}
