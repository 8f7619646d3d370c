//! GigaChat Model Provider
//!
//! Implements the ModelProvider trait for Sber's GigaChat API. Access is a
//! two-step dance: a client-credentials OAuth call issues a short-lived
//! access token, which then authorizes bearer calls to the chat-completions
//! endpoint. The token is cached and refreshed just before expiry.
//!
//! The production endpoints sit behind a certificate chain that is not in
//! the webpki root store, so certificate verification is a config toggle.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ModelError, ModelProvider, Result};
use crate::config::LLMConfig;

/// Refresh the token this many milliseconds before the server-side expiry.
const TOKEN_EXPIRY_MARGIN_MS: i64 = 60_000;

pub struct GigaChatProvider {
    config: LLMConfig,
    /// Authorization key for the OAuth call, as issued by the developer
    /// console (already base64-encoded client_id:client_secret).
    credentials: String,
    client: Client,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    /// Milliseconds since the Unix epoch, as reported by the OAuth endpoint.
    expires_at_ms: i64,
}

impl CachedToken {
    fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms + TOKEN_EXPIRY_MARGIN_MS < self.expires_at_ms
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_at: i64,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl GigaChatProvider {
    /// Create a new GigaChat provider
    ///
    /// # Arguments
    /// * `config` - Endpoint URLs, model name and sampling parameters
    /// * `credentials` - Authorization key from the GigaChat console
    pub fn new(config: LLMConfig, credentials: String) -> Self {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if config.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        Self {
            config,
            credentials,
            client: builder.build().expect("Failed to create HTTP client"),
            token: Mutex::new(None),
        }
    }

    fn now_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    /// Return a valid access token, refreshing through OAuth if the cached
    /// one is missing or about to expire. Holding the lock across the fetch
    /// keeps concurrent callers from stampeding the OAuth endpoint.
    async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Self::now_ms()) {
                return Ok(token.access_token.clone());
            }
        }

        tracing::debug!(url = %self.config.auth_url, "refreshing GigaChat access token");

        let response = self
            .client
            .post(&self.config.auth_url)
            .header("Authorization", format!("Basic {}", self.credentials))
            .header("RqUID", Uuid::new_v4().to_string())
            .form(&[("scope", self.config.scope.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else if e.is_connect() {
                    ModelError::ProviderUnavailable(e.to_string())
                } else {
                    ModelError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ModelError::AuthenticationFailed(text));
            } else if status.is_server_error() {
                return Err(ModelError::ProviderUnavailable(text));
            }
            return Err(ModelError::AuthenticationFailed(format!(
                "token endpoint returned {}: {}",
                status, text
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ModelError::ParseError(e.to_string()))?;

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at_ms: token.expires_at,
        });
        Ok(access_token)
    }

    /// Drop the cached token so the next call re-authenticates.
    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }
}

#[async_trait]
impl ModelProvider for GigaChatProvider {
    fn name(&self) -> &str {
        "gigachat"
    }

    async fn check_health(&self) -> bool {
        self.bearer_token().await.is_ok()
    }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        let token = self.bearer_token().await?;

        let url = format!("{}/chat/completions", self.config.base_url);
        let payload = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else if e.is_connect() {
                    ModelError::ProviderUnavailable(e.to_string())
                } else {
                    ModelError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            if status.as_u16() == 401 || status.as_u16() == 403 {
                // Token may have been revoked ahead of its expiry
                self.invalidate_token().await;
                return Err(ModelError::AuthenticationFailed(text));
            } else if status.as_u16() == 429 {
                return Err(ModelError::RateLimitExceeded);
            } else if status.is_server_error() {
                return Err(ModelError::ProviderUnavailable(text));
            }
            return Err(ModelError::InvalidRequest(text));
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::ParseError(e.to_string()))?;

        let content = data
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ModelError::ParseError("No choices in response".to_string()))?;

        if content.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        Ok(content)
    }
}
