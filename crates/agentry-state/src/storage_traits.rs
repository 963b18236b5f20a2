//! Storage trait definitions for Agentry
//!
//! These traits define the collaborator boundary of the execution engine:
//! - `AuditSink`: append-only audit trail for tool invocations
//! - `TaskStore`: terminal task snapshots and approval-suspended tasks
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// AuditSink: append-only tool audit trail
// ---------------------------------------------------------------------------

/// One audited tool invocation, attributable to a task and tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub tool_id: String,
    pub tool_name: String,
    pub tenant_id: String,
    pub task_id: Uuid,
    pub success: bool,
    pub duration_ms: u64,
    /// Serialized handler output, truncated.
    pub result_summary: String,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only acceptor of audit entries.
///
/// Guarantees:
/// - `append` returns once the entry is accepted; durability is the backend's concern.
/// - Entries are never rewritten or removed through this trait.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Accept one audit entry.
    async fn append(&self, entry: AuditEntry) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// TaskStore: task snapshots
// ---------------------------------------------------------------------------

/// Snapshot of a task as handed to persistence.
///
/// `payload` is the engine's full serialized task; the store treats it as opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub tenant_id: String,
    pub pack_id: String,
    /// Lifecycle state name (e.g. "done", "failed").
    pub state: String,
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// A task suspended on a human approval checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspendedTaskRecord {
    pub task: TaskRecord,
    /// Tool calls that were waiting on the approval verdict.
    pub pending_calls: serde_json::Value,
    /// Reason attached to the pending-approval decision.
    pub reason: String,
    /// Rule that produced the pending-approval decision.
    pub rule_id: String,
    /// SHA-256 hex digest of the task's message history at suspension.
    pub history_digest: String,
    pub suspended_at: DateTime<Utc>,
}

/// Persistence for task snapshots.
///
/// Guarantees:
/// - A terminal record, once saved, is never overwritten (`Conflict`).
/// - `take_suspended` removes the record, so a suspension resumes at most once.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a terminal task snapshot.
    async fn save_terminal(&self, record: TaskRecord) -> StorageResult<()>;

    /// Fetch a terminal snapshot by task id.
    async fn get_task(&self, task_id: Uuid) -> StorageResult<Option<TaskRecord>>;

    /// Persist a task suspended on an approval checkpoint.
    async fn save_suspended(&self, record: SuspendedTaskRecord) -> StorageResult<()>;

    /// Remove and return a suspended task. `NotFound` if absent.
    async fn take_suspended(&self, task_id: Uuid) -> StorageResult<SuspendedTaskRecord>;

    /// Task ids currently suspended for a tenant.
    async fn list_suspended(&self, tenant_id: &str) -> StorageResult<Vec<Uuid>>;
}

// ---------------------------------------------------------------------------
// Approval signals
// ---------------------------------------------------------------------------

/// Verdict delivered by a human approver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected { reason: String },
}

impl ApprovalDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalDecision::Approved)
    }
}

/// Resume-with-decision event keyed by task id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalSignal {
    pub task_id: Uuid,
    pub tenant_id: String,
    pub approver: String,
    #[serde(flatten)]
    pub decision: ApprovalDecision,
    pub received_at: DateTime<Utc>,
}

impl ApprovalSignal {
    pub fn approve(task_id: Uuid, tenant_id: impl Into<String>, approver: impl Into<String>) -> Self {
        Self {
            task_id,
            tenant_id: tenant_id.into(),
            approver: approver.into(),
            decision: ApprovalDecision::Approved,
            received_at: Utc::now(),
        }
    }

    pub fn reject(
        task_id: Uuid,
        tenant_id: impl Into<String>,
        approver: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            tenant_id: tenant_id.into(),
            approver: approver.into(),
            decision: ApprovalDecision::Rejected {
                reason: reason.into(),
            },
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_signal_serializes_flat_decision() {
        let signal = ApprovalSignal::reject(Uuid::new_v4(), "acme", "ops", "too risky");
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["decision"], "rejected");
        assert_eq!(json["reason"], "too risky");

        let back: ApprovalSignal = serde_json::from_value(json).unwrap();
        assert_eq!(back, signal);
    }

    #[test]
    fn approval_decision_is_approved() {
        assert!(ApprovalDecision::Approved.is_approved());
        assert!(!ApprovalDecision::Rejected { reason: "no".into() }.is_approved());
    }
}
