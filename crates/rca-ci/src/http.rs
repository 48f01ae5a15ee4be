//! OpenAI-compatible chat completion transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use rca_core::{CompletionTransport, Prompt, TransportError, TransportErrorKind};

use crate::error::{CiError, Result};

/// Longest provider error body kept in a transport error message.
const MAX_ERROR_BODY: usize = 500;

/// Connection settings for a chat completion endpoint.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl HttpConfig {
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Self {
        HttpConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Completion transport speaking the `/chat/completions` protocol.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self> {
        if config.model.trim().is_empty() {
            return Err(CiError::InvalidSetting {
                name: "model".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("ci-rca/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;
        Ok(HttpTransport {
            client,
            endpoint: format!("{}/chat/completions", config.base_url),
            model: config.model,
            api_key: config.api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Map a non-success HTTP status to a transport error class.
pub fn classify_status(status: StatusCode, body: &str) -> TransportError {
    let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    let message = format!("HTTP {}: {}", status.as_u16(), excerpt.trim());
    let lower = body.to_ascii_lowercase();

    let kind = if status == StatusCode::TOO_MANY_REQUESTS {
        TransportErrorKind::RateLimited
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        TransportErrorKind::Transient
    } else if status == StatusCode::BAD_REQUEST
        && (lower.contains("context") || (lower.contains("maximum") && lower.contains("tokens")))
    {
        TransportErrorKind::ContextOverflow
    } else {
        TransportErrorKind::Fatal
    };
    TransportError::new(kind, message)
}

fn classify_send_error(err: &reqwest::Error) -> TransportError {
    if err.is_builder() {
        TransportError::fatal(err.to_string())
    } else {
        TransportError::transient(err.to_string())
    }
}

/// Pull the first choice's content out of a completion body.
pub fn extract_content(body: &str) -> std::result::Result<String, TransportError> {
    let response: ChatResponse = serde_json::from_str(body).map_err(|e| {
        TransportError::new(TransportErrorKind::InvalidResponse, format!("bad envelope: {e}"))
    })?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| TransportError::new(TransportErrorKind::InvalidResponse, "empty completion"))
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn complete(
        &self,
        prompt: &Prompt,
        max_output_tokens: u32,
    ) -> std::result::Result<String, TransportError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            max_tokens: max_output_tokens,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_send_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify_send_error(&e))?;
        debug!(label = %prompt.label, status = status.as_u16(), bytes = body.len(), "completion response");

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        extract_content(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let kind = |code: u16, body: &str| {
            classify_status(StatusCode::from_u16(code).unwrap(), body).kind
        };
        assert_eq!(kind(429, "slow down"), TransportErrorKind::RateLimited);
        assert_eq!(kind(502, "bad gateway"), TransportErrorKind::Transient);
        assert_eq!(kind(503, ""), TransportErrorKind::Transient);
        assert_eq!(
            kind(400, "This model's maximum context length is 8192 tokens"),
            TransportErrorKind::ContextOverflow
        );
        assert_eq!(kind(400, "unknown parameter"), TransportErrorKind::Fatal);
        assert_eq!(kind(401, "invalid api key"), TransportErrorKind::Fatal);
    }

    #[test]
    fn test_error_message_is_bounded() {
        let body = "x".repeat(10_000);
        let err = classify_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert!(err.message.len() < MAX_ERROR_BODY + 32);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_extract_content() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "{\"category\": \"test\"}"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), r#"{"category": "test"}"#);

        let empty = extract_content(r#"{"choices": []}"#).unwrap_err();
        assert_eq!(empty.kind, TransportErrorKind::InvalidResponse);

        let garbage = extract_content("<html>").unwrap_err();
        assert_eq!(garbage.kind, TransportErrorKind::InvalidResponse);
        assert!(!garbage.is_retryable());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let transport = HttpTransport::new(HttpConfig::new("http://localhost:8080/v1/", "m", "k")).unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_empty_model_is_rejected() {
        assert!(HttpTransport::new(HttpConfig::new("http://localhost", " ", "k")).is_err());
    }
}
