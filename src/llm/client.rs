use super::{BackendError, CompletionBackend};
use crate::util::truncate_str;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Hosted OpenAI API root
pub const DEFAULT_REMOTE_BASE_URL: &str = "https://api.openai.com/v1/";
pub const DEFAULT_REMOTE_MODEL: &str = "gpt-4o-mini";

/// Local OpenAI-compatible server (Ollama, llama.cpp, MLC serve)
pub const DEFAULT_LOCAL_BASE_URL: &str = "http://127.0.0.1:11434/v1/";
pub const DEFAULT_LOCAL_MODEL: &str = "Llama-3-8B-Instruct-q4f32_1-MLC";
pub const DEFAULT_LOCAL_TEMPERATURE: f32 = 0.4;

const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Where and how to reach a chat-completions endpoint
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// API root; `chat/completions` is joined onto it
    pub base_url: Url,
    pub model: String,
    pub temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Shared HTTP plumbing of the remote and local backends
struct ChatClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    settings: ChatSettings,
}

impl ChatClient {
    fn new(settings: ChatSettings, api_key: Option<String>) -> Result<Self, BackendError> {
        let endpoint = settings
            .base_url
            .join("chat/completions")
            .map_err(|e| BackendError::Config(format!("invalid base URL: {}", e)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;
        Ok(Self {
            http,
            endpoint,
            api_key,
            settings,
        })
    }

    async fn chat(&self, backend: &str, system: &str, user: &str) -> Result<String, BackendError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: [
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.settings.temperature,
            stream: false,
        };

        info!(
            backend,
            model = %self.settings.model,
            system_chars = system.chars().count(),
            user_chars = user.chars().count(),
            "requesting completion"
        );

        let mut builder = self
            .http
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            BackendError::Malformed(format!("{}: {}", e, truncate_str(&text, 200)))
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Malformed("no choices returned".to_string()))?
            .message
            .content
            .unwrap_or_default();

        debug!(backend, answer_chars = content.chars().count(), "completion received");
        Ok(content.trim().to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> BackendError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| {
            let raw = truncate_str(body.trim(), 200);
            if raw.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                raw.to_string()
            }
        });
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimited,
        _ => BackendError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Hosted chat-completions API authenticated with a bearer key
pub struct RemoteBackend {
    client: ChatClient,
}

impl RemoteBackend {
    pub fn new(settings: ChatSettings, api_key: impl Into<String>) -> Result<Self, BackendError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(BackendError::Config("API key is empty".to_string()));
        }
        Ok(Self {
            client: ChatClient::new(settings, Some(api_key))?,
        })
    }
}

#[async_trait]
impl CompletionBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, BackendError> {
        self.client.chat(self.name(), system, user).await
    }
}

/// Model served on this machine, no credentials
pub struct LocalBackend {
    client: ChatClient,
}

impl LocalBackend {
    pub fn new(settings: ChatSettings) -> Result<Self, BackendError> {
        Ok(Self {
            client: ChatClient::new(settings, None)?,
        })
    }
}

#[async_trait]
impl CompletionBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, BackendError> {
        self.client.chat(self.name(), system, user).await
    }
}
