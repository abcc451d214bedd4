//! OpenAI-compatible brain implementation.
//!
//! This crate provides a [`Brain`] that talks to any endpoint speaking the
//! OpenAI chat-completions protocol.
//!
//! # Features
//!
//! - Text and image (data URL) turns
//! - Separate vision model for requests carrying images
//! - Configurable via environment variables or a builder
//!
//! # Usage
//!
//! ```rust,no_run
//! use openai_brain::OpenAiBrain;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let brain = OpenAiBrain::from_env()?;
//!     // Hand the brain to the car-search pipeline...
//!     Ok(())
//! }
//! ```

mod api_types;
mod brain;
mod config;

pub use brain::OpenAiBrain;
pub use config::{OpenAiBrainConfig, OpenAiBrainConfigBuilder};

// Re-export brain-core types for convenience
pub use brain_core::{async_trait, Brain, BrainError, ChatMessage, CompletionRequest};
