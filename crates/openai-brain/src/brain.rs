//! OpenAiBrain implementation using the chat-completions API.

use brain_core::{async_trait, Brain, BrainError, ChatMessage, CompletionRequest};
use reqwest::Client;
use tracing::{debug, info};

use crate::api_types::{ApiError, ChatCompletionRequest, ChatCompletionResponse};
use crate::config::OpenAiBrainConfig;

/// A brain that forwards each request to an OpenAI-compatible endpoint.
///
/// The brain is stateless: conversation turns travel with every request.
pub struct OpenAiBrain {
    client: Client,
    config: OpenAiBrainConfig,
}

impl OpenAiBrain {
    /// Create a new OpenAiBrain with the given configuration.
    pub fn new(config: OpenAiBrainConfig) -> Result<Self, BrainError> {
        if config.api_key.is_empty() {
            return Err(BrainError::Configuration("API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BrainError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "OpenAiBrain initialized with model: {}, vision model: {}",
            config.model, config.vision_model
        );

        Ok(Self { client, config })
    }

    /// Create an OpenAiBrain from environment variables.
    ///
    /// See [`OpenAiBrainConfig::from_env`] for the variables read.
    pub fn from_env() -> Result<Self, BrainError> {
        let config = OpenAiBrainConfig::from_env()?;
        Self::new(config)
    }

    /// Get the configuration.
    pub fn config(&self) -> &OpenAiBrainConfig {
        &self.config
    }

    /// Build the wire request: system prompt first, then the turns.
    fn build_request(&self, request: CompletionRequest) -> ChatCompletionRequest {
        let model = if request.has_images() {
            self.config.vision_model.clone()
        } else {
            self.config.model.clone()
        };

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system {
            messages.push(ChatMessage::system(system));
        }
        messages.extend(request.messages);

        ChatCompletionRequest {
            model,
            messages,
            max_tokens: request.max_tokens.or(self.config.max_tokens),
            temperature: request.temperature.or(self.config.temperature),
        }
    }

    /// Make a chat completion request.
    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, BrainError> {
        let url = format!("{}/v1/chat/completions", self.config.api_url.trim_end_matches('/'));

        debug!(model = %request.model, turns = request.messages.len(), "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| BrainError::Network(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BrainError::Network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(api_failure(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| BrainError::ProcessingFailed(format!("Failed to parse response: {}", e)))
    }
}

/// Turn a non-2xx body into an error, preferring the API's own message.
fn api_failure(status: u16, body: &str) -> BrainError {
    if let Ok(api_error) = serde_json::from_str::<ApiError>(body) {
        return BrainError::ProcessingFailed(format!(
            "API error ({}): {}",
            status, api_error.error.message
        ));
    }

    BrainError::ProcessingFailed(format!("API error ({}): {}", status, body))
}

/// Pull the first non-empty choice text out of a completion.
fn first_choice_text(completion: &ChatCompletionResponse) -> Result<String, BrainError> {
    completion
        .choices
        .first()
        .and_then(|c| c.message.content.as_deref())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or(BrainError::EmptyResponse)
}

#[async_trait]
impl Brain for OpenAiBrain {
    async fn complete(&self, request: CompletionRequest) -> Result<String, BrainError> {
        let wire = self.build_request(request);
        let completion = self.chat_completion(&wire).await?;

        if let Some(usage) = &completion.usage {
            debug!(
                "Token usage - prompt: {}, completion: {}, total: {}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }

        first_choice_text(&completion)
    }

    fn name(&self) -> &str {
        "OpenAiBrain"
    }
}
