//! Model Provider Abstraction Layer
//!
//! This module provides a common interface for the text model behind the
//! grading pipeline. The ModelProvider trait defines the contract a provider
//! must implement; GigaChat is the production implementation, and tests plug
//! in scripted mocks through the same trait.

use async_trait::async_trait;

pub mod gigachat;

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur when calling the model
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Model provider trait that all providers must implement
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "gigachat")
    fn name(&self) -> &str;

    /// Send a single prompt and return the model's reply text
    ///
    /// # Returns
    /// * `Ok(String)` - The reply, guaranteed non-empty
    /// * `Err(ModelError)` - If the request fails or the reply is empty
    async fn invoke(&self, prompt: &str) -> Result<String>;

    /// Check if the provider is currently healthy and available
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Extract the body of the first markdown code fence in the text.
///
/// Models routinely wrap JSON answers in ```json fences even when told not
/// to. Works even when there is trailing prose after the closing ```.
/// Returns `None` if no fenced block is found.
pub fn extract_fenced_block(content: &str) -> Option<&str> {
    // Find opening fence
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    // Find closing fence after the body starts
    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}
