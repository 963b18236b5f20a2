//! Model provider collaborator contract.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Message, ModelResponse, ToolSchema};

/// Everything a provider needs for one completion apart from the model id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
}

/// Any provider error counts as a breaker failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
}

/// Produces a completion for `request` from the concrete `model`.
///
/// Wire encoding is the implementor's concern.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn call(&self, model: &str, request: &ChatRequest)
        -> Result<ModelResponse, ProviderError>;
}
