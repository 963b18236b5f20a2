//! Structured observability hooks for task lifecycle events.
//!
//! This module provides:
//! - Task-scoped tracing spans, attached to async work with `tracing::Instrument`
//! - Emission functions for lifecycle, policy, firewall, tool and router events
//!
//! Events are emitted at `info!` level unless noted; filter with `RUST_LOG`.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::policy::PolicyDecision;
use crate::task::TaskState;

/// Span tagged with task and tenant ids.
pub fn task_span(task_id: Uuid, tenant_id: &str) -> tracing::Span {
    tracing::info_span!("agentry.task", task_id = %task_id, tenant_id = %tenant_id)
}

pub fn emit_task_started(task_id: Uuid, tenant_id: &str, pack_id: &str) {
    info!(event = "task.started", task_id = %task_id, tenant_id = %tenant_id, pack_id = %pack_id);
}

pub fn emit_task_finished(task_id: Uuid, state: TaskState, steps: u32, duration_ms: u64) {
    info!(
        event = "task.finished",
        task_id = %task_id,
        state = %state,
        steps = steps,
        duration_ms = duration_ms,
    );
}

pub fn emit_task_suspended(task_id: Uuid, rule_id: &str, reason: &str) {
    info!(event = "task.suspended", task_id = %task_id, rule_id = %rule_id, reason = %reason);
}

/// Allow decisions are logged at `debug!`.
pub fn emit_policy_decided(task_id: Uuid, decision: &PolicyDecision) {
    if decision.is_allowed() {
        debug!(event = "policy.decided", task_id = %task_id, verdict = "allow");
    } else {
        info!(
            event = "policy.decided",
            task_id = %task_id,
            verdict = ?decision.verdict,
            rule_id = %decision.rule_id,
            reason = %decision.reason,
        );
    }
}

pub fn emit_firewall_blocked(task_id: Uuid, stage: &str, reason: &str) {
    warn!(event = "firewall.blocked", task_id = %task_id, stage = %stage, reason = %reason);
}

pub fn emit_tool_executed(task_id: Uuid, tool_id: &str, success: bool, duration_ms: u64) {
    info!(
        event = "tool.executed",
        task_id = %task_id,
        tool_id = %tool_id,
        success = success,
        duration_ms = duration_ms,
    );
}

pub fn emit_breaker_opened(model: &str, failures: u32) {
    warn!(event = "breaker.opened", model = %model, failures = failures);
}

pub fn emit_router_fallback(from_model: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "router.fallback", from_model = %from_model, reason = %reason);
}
