//! HTTP client for Anthropic-compatible messages endpoints.
//!
//! Speaks the `/v1/messages` wire format with tool definitions attached.
//! Throttle responses (HTTP 429) surface as [`LlmError::RateLimited`] so the
//! sampling loop can apply its backoff policy.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use super::{InferenceProvider, MessagesRequest, MessagesResponse};
use crate::error::LlmError;

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Client for Anthropic-compatible messages APIs.
pub struct MessagesClient {
    /// Base URL for the API.
    api_base: String,
    /// API key for authentication.
    api_key: String,
    /// HTTP client for making API requests.
    http_client: Client,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: ApiErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

impl MessagesClient {
    /// Create a new client with explicit configuration.
    pub fn new(api_base: String, api_key: String) -> Self {
        Self {
            api_base,
            api_key,
            http_client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Create a client from `ANTHROPIC_API_KEY` and optional
    /// `ANTHROPIC_API_BASE` environment variables.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = env::var("ANTHROPIC_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        let api_base =
            env::var("ANTHROPIC_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Ok(Self::new(api_base, api_key))
    }
}

#[async_trait]
impl InferenceProvider for MessagesClient {
    async fn create_message(&self, request: MessagesRequest) -> Result<MessagesResponse, LlmError> {
        let url = format!("{}/v1/messages", self.api_base.trim_end_matches('/'));

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_body_parsing() {
        let body = r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad"}}"#;
        let parsed: ApiErrorBody = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.message, "bad");
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "id": "msg_1",
            "model": "claude-sonnet",
            "content": [
                {"type": "text", "text": "done"},
                {"type": "tool_use", "id": "t1", "name": "bash", "input": {"command": "ls"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 20}
        }"#;
        let response: MessagesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.content.len(), 2);
        assert_eq!(response.tool_uses().count(), 1);
        assert_eq!(response.usage.output_tokens, 20);
    }
}
