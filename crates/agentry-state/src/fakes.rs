//! In-memory fakes for storage traits (testing and local runs)
//!
//! Provides `MemoryAuditSink` and `MemoryTaskStore` that satisfy the trait
//! contracts without any external dependencies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryAuditSink
// ---------------------------------------------------------------------------

/// In-memory audit trail backed by a `Vec<AuditEntry>`.
///
/// `set_failing(true)` makes every subsequent append fail, for exercising
/// fail-closed audit paths.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Copy of every accepted entry, in append order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: AuditEntry) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("audit sink unavailable".into()));
        }
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryTaskStore
// ---------------------------------------------------------------------------

/// In-memory task store backed by two `HashMap`s keyed by task id.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    terminal: Mutex<HashMap<Uuid, TaskRecord>>,
    suspended: Mutex<HashMap<Uuid, SuspendedTaskRecord>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminal_count(&self) -> usize {
        self.terminal.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn suspended_count(&self) -> usize {
        self.suspended
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save_terminal(&self, record: TaskRecord) -> StorageResult<()> {
        let mut terminal = self.terminal.lock().unwrap_or_else(|e| e.into_inner());
        if terminal.contains_key(&record.task_id) {
            return Err(StorageError::Conflict(format!(
                "task {} already has a terminal snapshot",
                record.task_id
            )));
        }
        terminal.insert(record.task_id, record);
        Ok(())
    }

    async fn get_task(&self, task_id: Uuid) -> StorageResult<Option<TaskRecord>> {
        let terminal = self.terminal.lock().unwrap_or_else(|e| e.into_inner());
        Ok(terminal.get(&task_id).cloned())
    }

    async fn save_suspended(&self, record: SuspendedTaskRecord) -> StorageResult<()> {
        let mut suspended = self.suspended.lock().unwrap_or_else(|e| e.into_inner());
        suspended.insert(record.task.task_id, record);
        Ok(())
    }

    async fn take_suspended(&self, task_id: Uuid) -> StorageResult<SuspendedTaskRecord> {
        let mut suspended = self.suspended.lock().unwrap_or_else(|e| e.into_inner());
        suspended
            .remove(&task_id)
            .ok_or_else(|| StorageError::NotFound {
                kind: "suspended task",
                id: task_id.to_string(),
            })
    }

    async fn list_suspended(&self, tenant_id: &str) -> StorageResult<Vec<Uuid>> {
        let suspended = self.suspended.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<Uuid> = suspended
            .values()
            .filter(|r| r.task.tenant_id == tenant_id)
            .map(|r| r.task.task_id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}
