//! LLM client capability.

use async_trait::async_trait;

use super::wire::{LlmRequest, LlmResponse};
use crate::error::LlmError;

/// Transport capability for one generation call.
///
/// The adapter owns retry and validation policy; implementations only move
/// a request to the provider and a response back. The client is owned by
/// the caller and never closed by the adapter. Implementations must be
/// `Send + Sync` so one client can serve concurrent pipeline runs.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends one request.
    ///
    /// # Errors
    ///
    /// Transport failures map to [`LlmError::Transport`]; the `retryable`
    /// flag decides whether the adapter's backoff policy applies.
    async fn create(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;
}
