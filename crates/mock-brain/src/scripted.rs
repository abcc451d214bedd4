//! Scripted brain implementation - replays canned replies.

use std::collections::VecDeque;

use async_trait::async_trait;
use brain_core::{Brain, BrainError, CompletionRequest};
use tokio::sync::Mutex;

/// A brain that answers with pre-recorded replies, in order.
///
/// Every request is recorded so tests can assert on prompts. Once the
/// script runs out the brain reports itself unavailable.
#[derive(Debug, Default)]
pub struct ScriptedBrain {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBrain {
    /// Create a brain that returns `replies` one per call.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a failure; the next call after the queued replies returns
    /// `BrainError::ProcessingFailed` with this message.
    pub async fn push_failure(&self, message: impl Into<String>) {
        self.replies.lock().await.push_back(Err(message.into()));
    }

    /// Queue another successful reply.
    pub async fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().await.push_back(Ok(reply.into()));
    }

    /// All requests seen so far.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    /// Number of calls made so far.
    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl Brain for ScriptedBrain {
    async fn complete(&self, request: CompletionRequest) -> Result<String, BrainError> {
        self.requests.lock().await.push(request);

        match self.replies.lock().await.pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(BrainError::ProcessingFailed(message)),
            None => Err(BrainError::Unavailable("script exhausted".to_string())),
        }
    }

    fn name(&self) -> &str {
        "ScriptedBrain"
    }
}
