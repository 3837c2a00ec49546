use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}

/// Failure classes of the completion service. The evaluator turns every one
/// of them into a failed evaluation instead of propagating it.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("completion service returned an empty response")]
    EmptyResponse,

    #[error("configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Map an HTTP status + message to the matching class.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => LlmError::Auth(message),
            429 => LlmError::RateLimited(message),
            _ => LlmError::Api { status, message },
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate a response to the given prompt with optional system prompt.
    ///
    /// `None` knobs fall back to the client's configured defaults.
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse, LlmError>;

    /// Check if the completion service is reachable.
    async fn health_check(&self) -> Result<bool, LlmError>;

    fn model_name(&self) -> &str;

    /// Single-prompt convenience wrapper; blank output is an error.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self.generate(prompt, None, None, None).await?;
        if response.text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(response.text)
    }
}
