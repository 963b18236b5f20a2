//! Error types for the task lifecycle.

use super::state::TaskState;

/// Errors produced by task lifecycle operations.
///
/// Every variant is a programming error: callers never retry them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("cannot transition from terminal state {from} to {to}")]
    FromTerminal { from: TaskState, to: TaskState },

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: TaskState, to: TaskState },

    #[error("task is terminal ({state}); {operation} rejected")]
    Sealed {
        state: TaskState,
        operation: &'static str,
    },
}

/// Result type for task lifecycle operations.
pub type TaskResult<T> = std::result::Result<T, TaskError>;
