//! Language model contract

use async_trait::async_trait;

use crate::error::Result;

/// Completes a prompt in a single call
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for `prompt`
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Model identifier, for logging
    fn model(&self) -> &str;

    /// Whether the backing service is reachable
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
