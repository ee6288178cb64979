//! HTTP mock tests for the OpenAI-compatible chat backends.

use codeshift::llm::client::DEFAULT_REMOTE_MODEL;
use codeshift::llm::{BackendError, ChatSettings, CompletionBackend, LocalBackend, RemoteBackend};
use reqwest::Url;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings_for(server: &MockServer, temperature: Option<f32>) -> ChatSettings {
    ChatSettings {
        base_url: Url::parse(&format!("{}/", server.uri())).unwrap(),
        model: DEFAULT_REMOTE_MODEL.to_string(),
        temperature,
    }
}

fn remote_for(server: &MockServer) -> RemoteBackend {
    RemoteBackend::new(settings_for(server, None), "sk-test").unwrap()
}

fn answer(content: &str) -> serde_json::Value {
    json!({
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}],
    })
}

#[tokio::test]
async fn test_remote_sends_both_messages_and_trims_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hello"},
            ],
            "stream": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer("  hi there \n")))
        .expect(1)
        .mount(&server)
        .await;

    let reply = remote_for(&server).complete("be brief", "hello").await.unwrap();
    assert_eq!(reply, "hi there");
}

#[tokio::test]
async fn test_local_sends_temperature_without_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"temperature": 0.5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let backend = LocalBackend::new(settings_for(&server, Some(0.5))).unwrap();
    assert_eq!(backend.complete("s", "u").await.unwrap(), "ok");

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_unauthorized_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let err = remote_for(&server).complete("s", "u").await.unwrap_err();
    match err {
        BackendError::Unauthorized(message) => assert_eq!(message, "Incorrect API key provided"),
        other => panic!("Expected Unauthorized, got {other}"),
    }
}

#[tokio::test]
async fn test_rate_limit_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit exceeded"))
        .expect(1)
        .mount(&server)
        .await;

    let err = remote_for(&server).complete("s", "u").await.unwrap_err();
    assert!(matches!(err, BackendError::RateLimited));
}

#[tokio::test]
async fn test_server_error_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let err = remote_for(&server).complete("s", "u").await.unwrap_err();
    match err {
        BackendError::Api { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "Service Unavailable");
        }
        other => panic!("Expected Api error, got {other}"),
    }
}

#[tokio::test]
async fn test_malformed_and_empty_responses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("this is not json"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let backend = remote_for(&server);
    assert!(matches!(
        backend.complete("s", "u").await,
        Err(BackendError::Malformed(_))
    ));
    assert!(matches!(
        backend.complete("s", "u").await,
        Err(BackendError::Malformed(m)) if m == "no choices returned"
    ));
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let server = MockServer::start().await;
    let settings = settings_for(&server, None);
    drop(server);

    let backend = RemoteBackend::new(settings, "sk-test").unwrap();
    assert!(matches!(
        backend.complete("s", "u").await,
        Err(BackendError::Network(_))
    ));
}
