//! Chat page: search turns, image uploads and reset.

use askama::Template;
use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Form;
use brain_core::{ChatContent, ChatMessage, ContentPart};
use car_search::formatting::cell_text;
use car_search::{persona_prompt, SearchOutcome, SearchRequest};
use database::{chat_log, Identity};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{current_session, redirect};
use crate::error::{Result, WebError};
use crate::state::AppState;

/// Chat page template.
#[derive(Template)]
#[template(path = "chat.html")]
pub struct ChatTemplate {
    pub display_name: String,
    pub session_id: String,
    pub strategy: String,
    pub messages: Vec<MessageView>,
    /// Current guided-search phrases.
    pub phrases: Vec<String>,
    pub outcome: Option<OutcomeView>,
    pub flash: Option<String>,
}

/// A message as rendered.
pub struct MessageView {
    pub role: String,
    pub text: String,
    pub images: Vec<String>,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        let images = match &message.content {
            ChatContent::Text(_) => Vec::new(),
            ChatContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::ImageUrl { image_url } => Some(image_url.url.clone()),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
        };
        Self {
            role: message.role.as_str().to_string(),
            text: message.content.text(),
            images,
        }
    }
}

/// The last search result as rendered.
pub struct OutcomeView {
    pub summary: String,
    pub sql: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub suggestion: Option<String>,
}

impl From<&SearchOutcome> for OutcomeView {
    fn from(outcome: &SearchOutcome) -> Self {
        Self {
            summary: outcome.summary.clone(),
            sql: outcome.sql.clone(),
            columns: outcome.result.columns.clone(),
            rows: outcome
                .result
                .rows
                .iter()
                .map(|row| row.iter().map(cell_text).collect())
                .collect(),
            suggestion: outcome.suggestion.clone(),
        }
    }
}

/// Chat input form.
#[derive(Deserialize)]
pub struct MessageForm {
    #[serde(default)]
    pub message: String,
    /// `refine` appends to the current search, anything else starts anew.
    #[serde(default)]
    pub mode: Option<String>,
}

/// Render the open conversation.
pub async fn chat_page(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let Some((id, browser)) = current_session(&state, &headers).await else {
        return Ok(redirect("/login"));
    };
    let (Some(identity), Some(conversation)) = (browser.identity, browser.conversation) else {
        return Ok(redirect("/sessions"));
    };

    let messages = chat_log::get_messages(state.db.pool(), &identity.user_id, &conversation).await?;
    let flash = state.sessions.update(&id, |s| s.flash.take()).await.flatten();

    Ok(ChatTemplate {
        display_name: identity.display_name,
        session_id: conversation,
        strategy: state.pipeline.strategy().to_string(),
        messages: messages.iter().map(MessageView::from).collect(),
        phrases: browser.context.phrases().to_vec(),
        outcome: browser.last_outcome.as_ref().map(OutcomeView::from),
        flash,
    }
    .into_response())
}

/// Run one search turn and append it to the conversation.
pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<MessageForm>,
) -> Result<Response> {
    let Some((id, browser)) = current_session(&state, &headers).await else {
        return Ok(redirect("/login"));
    };
    let (Some(identity), Some(conversation)) = (browser.identity, browser.conversation) else {
        return Ok(redirect("/sessions"));
    };

    let text = form.message.trim();
    if text.is_empty() {
        return Ok(redirect("/chat"));
    }

    let mut context = browser.context;
    if form.mode.as_deref() == Some("refine") && !context.is_empty() {
        context.refine(text);
    } else {
        context.begin(text);
    }

    let pool = state.db.pool();
    let previous = chat_log::get_messages(pool, &identity.user_id, &conversation).await?;
    let history = recent(&previous, state.history_turns);
    let persona = returning_user_persona(&state, &identity).await?;

    let request = SearchRequest::new(context.clone())
        .with_history(history)
        .with_persona(persona);

    let (reply, outcome) = match state.pipeline.search(request).await {
        Ok(outcome) => {
            let rows = state.pipeline.config().sample_rows;
            (outcome.transcript(rows), Some(outcome))
        }
        Err(err) => {
            warn!(user_id = %identity.user_id, error = %err, "Search failed");
            (format!("Sorry, that search failed. {}", err), None)
        }
    };

    // Appended against the log as it is now, not as it was before the search.
    let turn = [ChatMessage::user(text), ChatMessage::assistant(reply)];
    let saved = chat_log::append_messages(pool, &identity.user_id, &conversation, &turn).await?;
    info!(
        user_id = %identity.user_id,
        session_id = %conversation,
        messages = saved.len(),
        ok = outcome.is_some(),
        "Search turn saved"
    );

    // A failed turn leaves the previous search state in place.
    if let Some(outcome) = outcome {
        state
            .sessions
            .update(&id, |s| {
                s.context = context;
                s.last_outcome = Some(outcome);
            })
            .await;
    }

    Ok(redirect("/chat"))
}

/// Describe an uploaded image. The same file twice in a row is ignored.
pub async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response> {
    let Some((id, browser)) = current_session(&state, &headers).await else {
        return Ok(redirect("/login"));
    };
    let (Some(identity), Some(conversation)) = (browser.identity, browser.conversation) else {
        return Ok(redirect("/sessions"));
    };

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let declared = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        upload = Some((declared, field.bytes().await?));
        break;
    }

    let Some((declared, bytes)) = upload else {
        return Err(WebError::BadRequest("missing image field".to_string()));
    };
    if bytes.is_empty() {
        return Ok(redirect("/chat"));
    }

    let digest = upload_digest(&bytes);
    if browser.last_upload.as_deref() == Some(digest.as_str()) {
        debug!("Ignoring repeated upload");
        return Ok(redirect("/chat"));
    }

    match state.pipeline.describe_image(&bytes, &declared).await {
        Ok(description) => {
            let turn = [description.message, ChatMessage::assistant(description.reply)];
            chat_log::append_messages(state.db.pool(), &identity.user_id, &conversation, &turn)
                .await?;

            info!(user_id = %identity.user_id, bytes = bytes.len(), "Image described");
            state
                .sessions
                .update(&id, |s| s.last_upload = Some(digest))
                .await;
        }
        Err(err) => {
            warn!(error = %err, "Image upload failed");
            state
                .sessions
                .update(&id, |s| s.flash = Some(err.to_string()))
                .await;
        }
    }

    Ok(redirect("/chat"))
}

/// Drop the current search phrases and result.
pub async fn reset(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some((id, _)) = current_session(&state, &headers).await {
        state.sessions.update(&id, |s| s.clear_search()).await;
    }
    redirect("/chat")
}

/// The last `turns` messages.
fn recent(messages: &[ChatMessage], turns: usize) -> Vec<ChatMessage> {
    messages[messages.len().saturating_sub(turns)..].to_vec()
}

/// Persona instruction for registered users with earlier messages.
async fn returning_user_persona(state: &AppState, identity: &Identity) -> Result<Option<String>> {
    if identity.anonymous {
        return Ok(None);
    }
    let history = chat_log::user_messages(state.db.pool(), &identity.user_id).await?;
    Ok(persona_prompt(&history))
}

fn upload_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
