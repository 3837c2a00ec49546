use crate::http::HttpClient;
use crate::traits::{CompletionClient, LlmError, LlmResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_INSTRUCTIONS: &str = "You are a careful, concise career assistant.";

/// Client for the OpenAI Responses API (and compatible gateways).
pub struct OpenAiClient {
    client: HttpClient,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ResponsesApiRequest<'a> {
    model: &'a str,
    input: &'a str,
    instructions: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponsesApiResponse {
    model: String,
    #[serde(default)]
    output: Vec<ResponseMessage>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Vec<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: Option<u32>,
}

impl OpenAiClient {
    /// Create a client for `endpoint` (e.g. `https://api.openai.com/v1`).
    pub fn new(endpoint: &str, api_key: String, model: String) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::Config(
                "no API credential configured for the OpenAI provider".into(),
            ));
        }
        let client = HttpClient::new(endpoint)?;
        Ok(Self {
            client,
            api_key,
            model,
            temperature: None,
            max_tokens: None,
        })
    }

    /// Defaults applied when a call leaves the knobs unset.
    pub fn with_defaults(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retries(mut self, n: usize) -> Self {
        self.client = self.client.with_retries(n);
        self
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse, LlmError> {
        let req = ResponsesApiRequest {
            model: &self.model,
            input: prompt,
            instructions: system_prompt.unwrap_or(DEFAULT_INSTRUCTIONS),
            temperature: temperature.or(self.temperature),
            max_output_tokens: max_tokens.or(self.max_tokens),
        };

        let resp: ResponsesApiResponse = self
            .client
            .post_json("responses", Some(&self.api_key), &req)
            .await?;

        let text: String = resp
            .output
            .iter()
            .flat_map(|msg| &msg.content)
            .filter(|c| c.kind == "output_text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            tracing::warn!(model = %resp.model, "llm.openai.empty_output");
            return Err(LlmError::EmptyResponse);
        }

        Ok(LlmResponse {
            text,
            model: Some(resp.model),
            tokens_used: resp.usage.and_then(|u| u.total_tokens),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool, LlmError> {
        match self
            .generate("Respond with just 'OK'", None, Some(16), Some(0.0))
            .await
        {
            Ok(_) => Ok(true),
            Err(LlmError::Auth(msg)) => Err(LlmError::Auth(msg)),
            Err(e) => {
                tracing::warn!(error = %e, "llm.openai.health_check_failed");
                Ok(false)
            }
        }
    }
}
