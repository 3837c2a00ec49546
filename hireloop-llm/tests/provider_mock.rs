mod common;

use hireloop_llm::ollama::OllamaClient;
use hireloop_llm::openai::OpenAiClient;
use hireloop_llm::{CompletionClient, LlmError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn openai_for(server: &MockServer) -> OpenAiClient {
    OpenAiClient::new(
        &format!("{}/v1", server.uri()),
        "sk-test".into(),
        "gpt-4o-mini".into(),
    )
    .expect("client")
    .with_retries(0)
}

#[tokio::test]
async fn openai_joins_output_text_parts() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "gpt-4o-mini", "input": "hello" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "output": [
                { "content": [
                    { "type": "output_text", "text": "{\"decision\": " },
                    { "type": "output_text", "text": "true}" }
                ]}
            ],
            "usage": { "total_tokens": 42 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = openai_for(&server)
        .generate("hello", Some("system"), Some(50), Some(0.1))
        .await
        .expect("generate");

    assert_eq!(response.text, "{\"decision\": true}");
    assert_eq!(response.tokens_used, Some(42));
}

#[tokio::test]
async fn openai_unauthorized_is_auth_error() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "error": { "message": "Incorrect API key" } })),
        )
        .mount(&server)
        .await;

    let err = openai_for(&server).complete("hello").await.unwrap_err();
    assert_eq!(err, LlmError::Auth("Incorrect API key".into()));
}

#[tokio::test]
async fn openai_throttling_is_rate_limited() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({ "message": "slow down" })))
        .mount(&server)
        .await;

    let err = openai_for(&server).complete("hello").await.unwrap_err();
    assert!(matches!(err, LlmError::RateLimited(_)));
}

#[tokio::test]
async fn openai_retries_server_errors_before_succeeding() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "output": [{ "content": [{ "type": "output_text", "text": "OK" }] }]
        })))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(
        &format!("{}/v1", server.uri()),
        "sk-test".into(),
        "gpt-4o-mini".into(),
    )
    .unwrap()
    .with_retries(1);
    assert_eq!(client.complete("ping").await.unwrap(), "OK");
}

#[tokio::test]
async fn openai_without_text_is_empty_response() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "output": [{ "content": [{ "type": "refusal", "text": "" }] }]
        })))
        .mount(&server)
        .await;

    let err = openai_for(&server).complete("hello").await.unwrap_err();
    assert_eq!(err, LlmError::EmptyResponse);
}

#[tokio::test]
async fn ollama_generate_sends_system_and_options() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "llama3.1",
            "system": "be brief",
            "stream": false,
            "options": { "num_predict": 64 }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "response": "yes", "eval_count": 3 })),
        )
        .mount(&server)
        .await;

    let client = OllamaClient::new(&server.uri(), "llama3.1".into()).unwrap();
    let response = client
        .generate("apply?", Some("be brief"), Some(64), None)
        .await
        .unwrap();
    assert_eq!(response.text, "yes");
    assert_eq!(response.tokens_used, Some(3));
}

#[tokio::test]
async fn ollama_server_error_is_api_error() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&server.uri(), "llama3.1".into()).unwrap();
    let err = client.complete("apply?").await.unwrap_err();
    assert_eq!(
        err,
        LlmError::Api {
            status: 500,
            message: "model crashed".into()
        }
    );
}

#[tokio::test]
async fn ollama_connect_pulls_missing_model() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "models": [{ "name": "other" }] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/pull"))
        .and(body_partial_json(json!({ "model": "llama3.1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::connect(&server.uri(), "llama3.1".into())
        .await
        .expect("connect");
    assert!(client.health_check().await.unwrap());
}
