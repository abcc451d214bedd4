//! Core trait and types for language-model backends.
//!
//! This crate provides the shared interface between the car-search pipeline
//! and whatever model answers it. It defines:
//!
//! - [`Brain`] - The trait that all model backends implement
//! - [`CompletionRequest`] / [`ChatMessage`] - Request types, including
//!   image attachments
//! - [`BrainError`] - Error types for model calls
//!
//! # Example
//!
//! ```rust
//! use brain_core::{async_trait, Brain, BrainError, CompletionRequest};
//!
//! struct FixedBrain;
//!
//! #[async_trait]
//! impl Brain for FixedBrain {
//!     async fn complete(&self, _request: CompletionRequest) -> Result<String, BrainError> {
//!         Ok("SELECT * FROM cars LIMIT 5;".to_string())
//!     }
//!
//!     fn name(&self) -> &str {
//!         "FixedBrain"
//!     }
//! }
//! ```

mod error;
mod message;
mod prompt;
mod trait_def;

pub use error::BrainError;
pub use message::{ChatContent, ChatMessage, CompletionRequest, ContentPart, ImageUrl, Role};
pub use prompt::{hash_prompt, short_fingerprint};
pub use trait_def::Brain;

// Re-export async_trait for convenience
pub use async_trait::async_trait;
