//! Returning-user persona prompt.

use brain_core::{ChatMessage, Role};

/// How many recent user messages the persona quotes.
pub const PERSONA_MESSAGES: usize = 5;

/// Extra system instruction built from a user's recent messages.
///
/// `history` is every user message across the user's conversations, oldest
/// first. Image uploads are skipped. Returns `None` when there is nothing to
/// quote.
pub fn persona_prompt(history: &[ChatMessage]) -> Option<String> {
    let texts: Vec<String> = history
        .iter()
        .filter(|m| m.role == Role::User && !m.content.has_image())
        .map(|m| m.content.text())
        .filter(|t| !t.trim().is_empty())
        .collect();

    if texts.is_empty() {
        return None;
    }

    let recent = &texts[texts.len().saturating_sub(PERSONA_MESSAGES)..];
    let lines = recent
        .iter()
        .map(|t| format!("- {}", t.trim()))
        .collect::<Vec<_>>()
        .join("\n");

    Some(format!(
        "This is a returning user. Here are recent things they have said:\n{}\n\
         When responding, consider the user's style and topics above.",
        lines
    ))
}
