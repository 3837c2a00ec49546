//! Provider-agnostic completion integration for hireloop.
//!
//! This crate exposes the [`CompletionClient`] interface consumed by the
//! evaluator, the typed [`LlmError`] it reports, and concrete clients for
//! OpenAI-compatible endpoints and Ollama.
//!
//! # Examples
//! ```no_run
//! use hireloop_config::LlmConfig;
//! use hireloop_llm::ensure_llm_ready;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let cfg = LlmConfig::Ollama {
//!     model: "llama3.1".into(),
//!     endpoint: "http://localhost:11434".into(),
//!     temperature: None,
//!     max_tokens: None,
//! };
//! let client = ensure_llm_ready(&cfg, None).await?;
//! assert!(!client.model_name().is_empty());
//! # Ok(())
//! # }
//! ```
pub mod http;
pub mod ollama;
pub mod openai;
pub mod traits;

use anyhow::Context;
use hireloop_config::LlmConfig;
use ollama::OllamaClient;
use openai::OpenAiClient;
use std::sync::Arc;

pub use traits::{CompletionClient, LlmError, LlmResponse};

pub type SharedCompletionClient = Arc<dyn CompletionClient + Send + Sync + 'static>;

/// Build a client without probing the provider.
///
/// A non-blank `stored_credential` wins over the token in the config file.
pub fn build_client(
    config: &LlmConfig,
    stored_credential: Option<&str>,
) -> Result<SharedCompletionClient, LlmError> {
    match config {
        LlmConfig::Openai {
            model,
            auth_token,
            temperature,
            max_tokens,
            endpoint,
        } => {
            let key = stored_credential
                .filter(|k| !k.trim().is_empty())
                .or(auth_token.as_deref())
                .unwrap_or_default();
            let client = OpenAiClient::new(endpoint, key.to_string(), model.clone())?
                .with_defaults(*temperature, *max_tokens);
            Ok(Arc::new(client))
        }
        LlmConfig::Ollama {
            model,
            endpoint,
            temperature,
            max_tokens,
        } => {
            let client = OllamaClient::new(endpoint, model.clone())?
                .with_defaults(*temperature, *max_tokens);
            Ok(Arc::new(client))
        }
    }
}

/// Build a client and make sure the provider answers. Ollama models are
/// pulled when missing; an unhealthy OpenAI endpoint only logs a warning.
pub async fn ensure_llm_ready(
    config: &LlmConfig,
    stored_credential: Option<&str>,
) -> anyhow::Result<SharedCompletionClient> {
    match config {
        LlmConfig::Ollama {
            model,
            endpoint,
            temperature,
            max_tokens,
        } => {
            let client = OllamaClient::connect(endpoint, model.clone())
                .await
                .with_context(|| format!("ollama at {endpoint} is not ready"))?
                .with_defaults(*temperature, *max_tokens);
            Ok(Arc::new(client))
        }
        LlmConfig::Openai { .. } => {
            let client = build_client(config, stored_credential)
                .context("failed to build completion client")?;
            if !client.health_check().await? {
                tracing::warn!(model = client.model_name(), "llm.health_check.degraded");
            }
            Ok(client)
        }
    }
}
