//! Mock brain implementations.
//!
//! `ScriptedBrain` replays canned replies in order and records the requests
//! it saw, so tests can drive the search pipeline without a model.
//!
//! For production use, see the `openai-brain` crate.
//!
//! # Example
//!
//! ```rust
//! use mock_brain::{Brain, ChatMessage, CompletionRequest, ScriptedBrain};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mock_brain::BrainError> {
//!     let brain = ScriptedBrain::new(["SELECT * FROM cars LIMIT 5;"]);
//!
//!     let request = CompletionRequest::default().message(ChatMessage::user("any car"));
//!     let reply = brain.complete(request).await?;
//!     assert_eq!(reply, "SELECT * FROM cars LIMIT 5;");
//!     Ok(())
//! }
//! ```

mod scripted;

// Re-export brain-core types for convenience
pub use brain_core::{async_trait, Brain, BrainError, ChatMessage, CompletionRequest};

pub use scripted::ScriptedBrain;
