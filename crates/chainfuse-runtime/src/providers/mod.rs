//! Model client abstractions for chainfuse-runtime.
//!
//! A [`ModelClient`] is the async counterpart of the core `Model` trait.
//! Clients are registered by name in a [`ModelRegistry`], which also serves
//! as the display-name resolver for fusion results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod registry;

pub use registry::ModelRegistry;

use chainfuse_core::ExternalError;

/// Errors from model clients.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Model not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Other(ExternalError),
}

/// Token usage from a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Response from a model client.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Raw generated text, parsed by the orchestrator
    pub content: String,

    /// Token usage
    pub usage: TokenUsage,
}

impl Completion {
    /// A completion with no usage reported.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: TokenUsage::default(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// An async text-generation backend.
///
/// Implementations own transport, authentication and retries. The
/// orchestrator only sends fully resolved prompts.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send a prompt and return the raw response.
    async fn complete(&self, prompt: &str) -> Result<Completion, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    #[async_trait]
    impl ModelClient for Upper {
        async fn complete(&self, prompt: &str) -> Result<Completion, ModelError> {
            Ok(Completion::text(prompt.to_uppercase()).with_usage(TokenUsage::new(3, 4)))
        }
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_token_usage_total_saturates() {
        let usage = TokenUsage::new(u32::MAX, 10);
        assert_eq!(usage.total(), u32::MAX);
    }

    #[tokio::test]
    async fn test_client_completion() {
        let completion = Upper.complete("hi").await.unwrap();
        assert_eq!(completion.content, "HI");
        assert_eq!(completion.usage.total(), 7);
    }

    #[test]
    fn test_other_error_is_transparent() {
        let err = ModelError::Other("socket closed".into());
        assert_eq!(err.to_string(), "socket closed");
    }
}
