//! The Brain trait definition.

use async_trait::async_trait;

use crate::error::BrainError;
use crate::message::CompletionRequest;

/// A language-model backend that turns a request into free-form text.
///
/// This trait is object-safe and can be used with `Arc<dyn Brain>`.
#[async_trait]
pub trait Brain: Send + Sync {
    /// Run one completion and return the model's text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, BrainError>;

    /// Get a human-readable name for this backend.
    fn name(&self) -> &str;

    /// Check if the backend is ready to take requests.
    ///
    /// Default implementation always returns true.
    async fn is_ready(&self) -> bool {
        true
    }
}
