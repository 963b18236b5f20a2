//! Audit entry construction for tool invocations.

use chrono::Utc;
use uuid::Uuid;

use agentry_state::AuditEntry;

use crate::domain::ToolDef;

use super::executor::ToolExecutionResult;

/// Longest result summary stored in an audit entry, in characters.
pub const SUMMARY_MAX_CHARS: usize = 500;

pub fn audit_entry(
    tool: &ToolDef,
    tenant_id: &str,
    task_id: Uuid,
    result: &ToolExecutionResult,
) -> AuditEntry {
    let result_summary = result
        .output
        .as_ref()
        .map(|v| truncate(&v.to_string(), SUMMARY_MAX_CHARS))
        .unwrap_or_default();

    AuditEntry {
        tool_id: tool.id.clone(),
        tool_name: tool.name.clone(),
        tenant_id: tenant_id.to_string(),
        task_id,
        success: result.success,
        duration_ms: result.duration_ms,
        result_summary,
        error: result.error.clone(),
        timestamp: Utc::now(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
