//! Reqwest-backed Responses-API client (feature `openai`).

use async_trait::async_trait;
use reqwest::StatusCode;

use super::client::LlmClient;
use super::wire::{LlmRequest, LlmResponse};
use crate::error::LlmError;

/// Environment variable consulted when no explicit key is supplied.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Thin HTTP client for the OpenAI Responses endpoint.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// Creates a client, resolving the key from the argument first and the
    /// `OPENAI_API_KEY` environment variable second.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MissingApiKey`] when neither source yields a key.
    pub fn new(api_key: Option<String>) -> Result<Self, LlmError> {
        let api_key = api_key
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
            .ok_or(LlmError::MissingApiKey)?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Overrides the API base URL (proxies, test servers).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn create(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let response = self
            .http
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::Transport {
                status: None,
                message: e.to_string(),
                retryable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retryable =
                status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Transport {
                status: Some(status.as_u16()),
                message: truncate(&body, 512),
                retryable,
            });
        }

        response
            .json::<LlmResponse>()
            .await
            .map_err(|e| LlmError::Transport {
                status: Some(status.as_u16()),
                message: format!("invalid response body: {e}"),
                retryable: false,
            })
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let cut: String = text.chars().take(limit).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_key_wins() {
        let client = OpenAiClient::new(Some("sk-test".to_string())).unwrap();
        assert_eq!(client.api_key, "sk-test");
    }

    #[test]
    fn test_empty_key_rejected() {
        // An empty explicit key falls through to the environment; with the
        // variable unset this must fail.
        if std::env::var(API_KEY_ENV).is_err() {
            assert!(matches!(
                OpenAiClient::new(Some(String::new())),
                Err(LlmError::MissingApiKey)
            ));
        }
    }

    #[test]
    fn test_truncate_long_bodies() {
        let long = "x".repeat(600);
        let cut = truncate(&long, 512);
        assert!(cut.chars().count() <= 513);
        assert!(cut.ends_with('…'));
    }
}
