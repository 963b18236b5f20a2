//! Error types for the sandbox module.
//!
//! Timeouts and handler failures are not errors: they come back as a failed
//! [`ToolExecutionResult`](super::ToolExecutionResult) for the caller to
//! interpret.

use agentry_state::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("tool '{tool_id}' is denied by policy")]
    Denied { tool_id: String },

    #[error("no handler registered for tool '{tool_id}'")]
    NoHandler { tool_id: String },

    #[error("invalid sandbox policy for tool '{tool_id}': {reason}")]
    InvalidPolicy { tool_id: String, reason: String },

    /// The audit sink rejected the entry; the invocation is not reported as
    /// executed.
    #[error("audit write failed: {0}")]
    Audit(#[from] StorageError),
}

impl SandboxError {
    /// Missing handlers and invalid policies are operator errors, never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SandboxError::NoHandler { .. } | SandboxError::InvalidPolicy { .. }
        )
    }
}

pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
