//! Configuration for OpenAiBrain.

use brain_core::BrainError;
use std::env;
use std::time::Duration;

/// Default API base URL.
pub const DEFAULT_API_URL: &str = "https://api.openai.com";

/// Default model for text requests.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for OpenAiBrain.
#[derive(Debug, Clone)]
pub struct OpenAiBrainConfig {
    /// API base URL (without `/v1/...`).
    pub api_url: String,

    /// API key for authentication.
    pub api_key: String,

    /// Model name to use for text-only requests.
    pub model: String,

    /// Model name to use when a request carries images.
    pub vision_model: String,

    /// Maximum tokens for response.
    pub max_tokens: Option<u32>,

    /// Default temperature (0.0 - 2.0), used when a request sets none.
    pub temperature: Option<f32>,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for OpenAiBrainConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            vision_model: DEFAULT_MODEL.to_string(),
            max_tokens: Some(512),
            temperature: Some(0.0),
            timeout: Duration::from_secs(60),
        }
    }
}

impl OpenAiBrainConfig {
    /// Create configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `OPENAI_API_KEY` - API key for authentication
    ///
    /// Optional environment variables:
    /// - `OPENAI_API_URL` - API URL (default: https://api.openai.com)
    /// - `OPENAI_MODEL` - Model name (default: gpt-4o-mini)
    /// - `OPENAI_VISION_MODEL` - Model for image requests (default: same as `OPENAI_MODEL`)
    /// - `OPENAI_MAX_TOKENS` - Max tokens (default: 512)
    /// - `OPENAI_TEMPERATURE` - Temperature (default: 0.0)
    /// - `OPENAI_TIMEOUT_SECS` - Request timeout in seconds (default: 60)
    pub fn from_env() -> Result<Self, BrainError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| BrainError::Configuration("OPENAI_API_KEY not set".to_string()))?;

        let api_url = env::var("OPENAI_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let model = env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let vision_model = env::var("OPENAI_VISION_MODEL").unwrap_or_else(|_| model.clone());

        let max_tokens = env::var("OPENAI_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(Some(512));

        let temperature = env::var("OPENAI_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(Some(0.0));

        let timeout = env::var("OPENAI_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        Ok(Self {
            api_url,
            api_key,
            model,
            vision_model,
            max_tokens,
            temperature,
            timeout,
        })
    }

    /// Create a new config builder.
    pub fn builder() -> OpenAiBrainConfigBuilder {
        OpenAiBrainConfigBuilder::default()
    }
}

/// Builder for OpenAiBrainConfig.
#[derive(Debug, Default)]
pub struct OpenAiBrainConfigBuilder {
    config: OpenAiBrainConfig,
}

impl OpenAiBrainConfigBuilder {
    /// Set the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    /// Set the API URL.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    /// Set the text model name.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set the vision model name.
    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = model.into();
        self
    }

    /// Set the max tokens.
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.config.max_tokens = Some(tokens);
        self
    }

    /// Set the default temperature.
    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.temperature = Some(temp);
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> OpenAiBrainConfig {
        self.config
    }
}
