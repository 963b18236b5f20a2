//! Error types for the router module.

use super::config::ModelTier;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// The tier has no model in the routing table. Never retried.
    #[error("no model mapped for tier '{0}'")]
    UnmappedTier(ModelTier),

    #[error("all models in the fallback chain for tier '{tier}' are unavailable: {last_error}")]
    AllProvidersUnavailable { tier: ModelTier, last_error: String },
}

impl RouterError {
    /// Configuration errors are surfaced immediately rather than retried.
    pub fn is_configuration(&self) -> bool {
        matches!(self, RouterError::UnmappedTier(_))
    }
}

pub type RouterResult<T> = std::result::Result<T, RouterError>;
