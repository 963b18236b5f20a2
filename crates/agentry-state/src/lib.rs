//! Agentry-State: collaborator contracts for the execution engine
//!
//! The engine never talks to a database directly. Everything it hands off
//! crosses one of the narrow async traits defined here:
//!
//! - `AuditSink`: append-only acceptor of tool audit entries
//! - `TaskStore`: terminal task snapshots and approval-suspended tasks
//!
//! `ApprovalSignal` is the event an external approval source delivers to
//! resume a suspended task. In-memory fakes live in [`fakes`].

mod error;
pub mod fakes;
pub mod storage_traits;

pub use error::StorageError;
pub use storage_traits::{
    ApprovalDecision, ApprovalSignal, AuditEntry, AuditSink, StorageResult,
    SuspendedTaskRecord, TaskRecord, TaskStore,
};
