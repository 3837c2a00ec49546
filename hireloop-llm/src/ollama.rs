use crate::http::{HttpClient, HttpError};
use crate::traits::{CompletionClient, LlmError, LlmResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const NOT_RUNNING: &str = "no Ollama server answered; start one with `ollama serve`";

/// Local generation is slow on CPU-only hosts.
const GENERATE_TIMEOUT: Duration = Duration::from_secs(180);
const PULL_TIMEOUT: Duration = Duration::from_secs(900);

/// Client for a local Ollama server.
pub struct OllamaClient {
    http: HttpClient,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize, Default)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize, Default)]
struct TagList {
    #[serde(default)]
    models: Vec<LocalModel>,
}

#[derive(Deserialize)]
struct LocalModel {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: String,
}

impl OllamaClient {
    /// No network traffic happens here.
    pub fn new(base_url: &str, model: String) -> Result<Self, LlmError> {
        let http = HttpClient::new(base_url)?.with_timeout(GENERATE_TIMEOUT);
        Ok(Self {
            http,
            model,
            temperature: None,
            max_tokens: None,
        })
    }

    /// Like [`OllamaClient::new`], then checks the server and pulls the model
    /// when it is missing locally.
    pub async fn connect(base_url: &str, model: String) -> Result<Self, LlmError> {
        let client = Self::new(base_url, model)?;
        let local = client.local_models().await?;
        if !local.iter().any(|name| name == &client.model) {
            client.pull().await?;
        }
        Ok(client)
    }

    pub fn with_defaults(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    async fn local_models(&self) -> Result<Vec<String>, LlmError> {
        let tags: TagList = self.http.get_json("api/tags").await.map_err(|e| match e {
            HttpError::Network(_) => LlmError::Network(NOT_RUNNING.into()),
            other => other.into(),
        })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull(&self) -> Result<(), LlmError> {
        tracing::info!(model = %self.model, "llm.ollama.pull.start");
        let request = PullRequest {
            model: &self.model,
            stream: false,
        };
        let reply: PullStatus = self
            .http
            .clone()
            .with_timeout(PULL_TIMEOUT)
            .post_json("api/pull", None, &request)
            .await?;
        tracing::info!(model = %self.model, status = %reply.status, "llm.ollama.pull.done");
        Ok(())
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse, LlmError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system: system_prompt,
            stream: false,
            options: GenerateOptions {
                temperature: temperature.or(self.temperature),
                num_predict: max_tokens.or(self.max_tokens),
            },
        };
        let reply: GenerateResponse = self.http.post_json("api/generate", None, &request).await?;
        if reply.response.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(LlmResponse {
            text: reply.response,
            model: Some(self.model.clone()),
            tokens_used: reply.eval_count,
        })
    }

    async fn health_check(&self) -> Result<bool, LlmError> {
        Ok(self.local_models().await.is_ok())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
