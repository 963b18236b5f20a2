//! Error types for the execution engine.

use uuid::Uuid;

use agentry_state::StorageError;

use crate::domain::ConfigError;
use crate::firewall::FirewallError;
use crate::sandbox::SandboxError;
use crate::task::TaskError;

/// Errors that stop the engine before it can produce a task snapshot.
///
/// Policy rejections, blocked content and exhausted retries are not errors:
/// they end the task and come back as its terminal state.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Firewall(#[from] FirewallError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("task snapshot serialization failed: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("task {task_id} belongs to tenant '{owner}', signal came from '{tenant_id}'")]
    TenantMismatch {
        task_id: Uuid,
        owner: String,
        tenant_id: String,
    },

    #[error("no agent config for pack '{pack_id}' (task {task_id})")]
    UnknownPack { task_id: Uuid, pack_id: String },

    #[error("task {task_id} history changed while suspended; refusing to resume")]
    DigestMismatch { task_id: Uuid },

    /// A run stopped on an engine error; the task was failed with
    /// `internal` and persisted before this was returned.
    #[error("task {task_id} aborted: {source}")]
    Aborted {
        task_id: Uuid,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Operator or programming errors; retrying cannot help.
    pub fn is_configuration(&self) -> bool {
        match self {
            EngineError::Config(_) | EngineError::Firewall(_) | EngineError::Task(_) => true,
            EngineError::Sandbox(err) => err.is_configuration(),
            EngineError::UnknownPack { .. } => true,
            EngineError::Aborted { source, .. } => source.is_configuration(),
            _ => false,
        }
    }

    /// The task this error concerns, when one existed.
    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            EngineError::TenantMismatch { task_id, .. }
            | EngineError::UnknownPack { task_id, .. }
            | EngineError::DigestMismatch { task_id }
            | EngineError::Aborted { task_id, .. } => Some(*task_id),
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
