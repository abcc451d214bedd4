//! Chat message and request types.
//!
//! The serialized shape matches the OpenAI chat-completions wire format, so
//! a message can be stored as JSON and sent to the API unchanged.

use serde::{Deserialize, Serialize};

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// An image reference, usually a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One part of a multi-part message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Message content: plain text or a list of text/image parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl ChatContent {
    /// Concatenate all text parts, ignoring images.
    pub fn text(&self) -> String {
        match self {
            ChatContent::Text(text) => text.clone(),
            ChatContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Whether any part is an image.
    pub fn has_image(&self) -> bool {
        match self {
            ChatContent::Text(_) => false,
            ChatContent::Parts(parts) => parts
                .iter()
                .any(|part| matches!(part, ContentPart::ImageUrl { .. })),
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: ChatContent,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: ChatContent::Text(content.into()),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: ChatContent::Text(content.into()),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: ChatContent::Text(content.into()),
        }
    }

    /// Create a user message carrying text and one image.
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: ChatContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }
}

/// A request for a single completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    /// System instructions, sent ahead of the turns.
    pub system: Option<String>,
    /// Conversation turns, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature override.
    pub temperature: Option<f32>,
    /// Maximum tokens override.
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Start a request with the given system instructions.
    pub fn with_system(system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..Self::default()
        }
    }

    /// Append a turn.
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Append several turns.
    pub fn messages(mut self, messages: impl IntoIterator<Item = ChatMessage>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Whether any turn carries an image.
    pub fn has_images(&self) -> bool {
        self.messages.iter().any(|m| m.content.has_image())
    }

    /// Text of the last user turn, if any.
    pub fn last_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message_serializes_as_string() {
        let json = serde_json::to_value(ChatMessage::user("hello")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn test_image_message_wire_shape() {
        let msg = ChatMessage::user_with_image("Please analyze this image.", "data:image/png;base64,AAA");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "data:image/png;base64,AAA");

        let back: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
        assert!(back.content.has_image());
        assert_eq!(back.content.text(), "Please analyze this image.");
    }

    #[test]
    fn test_last_user_text() {
        let request = CompletionRequest::with_system("sys")
            .message(ChatMessage::user("first"))
            .message(ChatMessage::assistant("reply"))
            .message(ChatMessage::user("second"));

        assert_eq!(request.last_user_text().as_deref(), Some("second"));
        assert!(!request.has_images());
    }
}
