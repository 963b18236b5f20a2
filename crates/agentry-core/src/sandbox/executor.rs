//! Tool execution: denylist, handler lookup, concurrency limit, timeout,
//! audit.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use agentry_state::AuditSink;

use crate::domain::ToolDef;
use crate::metrics::METRICS;
use crate::obs;

use super::audit::audit_entry;
use super::error::{SandboxError, SandboxResult};
use super::handler::{ToolContext, ToolHandler};
use super::policy::SandboxPolicy;

/// Outcome of a tool invocation that reached its handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub success: bool,
    /// Handler output (present on success).
    pub output: Option<Value>,
    /// Error message (present on failure).
    pub error: Option<String>,
    /// Wall-clock time from request to outcome, queueing included.
    pub duration_ms: u64,
}

impl ToolExecutionResult {
    pub fn succeeded(output: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            duration_ms,
        }
    }

    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// One request to run a tool.
#[derive(Debug, Clone)]
pub struct ToolInvocation<'a> {
    pub tool: &'a ToolDef,
    pub arguments: Value,
    pub tenant_id: &'a str,
    pub task_id: Uuid,
    /// Pack-level denylist, checked alongside the sandbox's own.
    pub denied: &'a [String],
}

impl<'a> ToolInvocation<'a> {
    pub fn new(tool: &'a ToolDef, arguments: Value, tenant_id: &'a str, task_id: Uuid) -> Self {
        Self {
            tool,
            arguments,
            tenant_id,
            task_id,
            denied: &[],
        }
    }

    pub fn with_denied(mut self, denied: &'a [String]) -> Self {
        self.denied = denied;
        self
    }
}

/// Executes registered tool handlers under their resolved sandbox policy.
///
/// Shared by every task. Handlers are registered before any task runs; the
/// limiters are created lazily, one per tool id and permit count, and shared
/// by every task declaring that pair.
pub struct ToolSandbox {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    denied: HashSet<String>,
    limiters: Mutex<HashMap<(String, usize), Arc<Semaphore>>>,
    default_concurrency: usize,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for ToolSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut handlers: Vec<&String> = self.handlers.keys().collect();
        handlers.sort();
        f.debug_struct("ToolSandbox")
            .field("handlers", &handlers)
            .field("denied", &self.denied)
            .field("default_concurrency", &self.default_concurrency)
            .finish_non_exhaustive()
    }
}

impl ToolSandbox {
    pub fn new(audit: Arc<dyn AuditSink>, default_concurrency: usize) -> Self {
        Self {
            handlers: HashMap::new(),
            denied: HashSet::new(),
            limiters: Mutex::new(HashMap::new()),
            default_concurrency: default_concurrency.max(1),
            audit,
        }
    }

    pub fn register(&mut self, tool_id: impl Into<String>, handler: impl ToolHandler + 'static) {
        self.handlers.insert(tool_id.into(), Arc::new(handler));
    }

    /// Deny `tool_id` for every invocation through this sandbox.
    pub fn deny(&mut self, tool_id: impl Into<String>) {
        self.denied.insert(tool_id.into());
    }

    pub fn is_denied(&self, tool_id: &str, pack_denied: &[String]) -> bool {
        self.denied.contains(tool_id) || pack_denied.iter().any(|d| d == tool_id)
    }

    /// Run one invocation.
    ///
    /// Denied tools and missing handlers are errors. Timeouts, handler
    /// errors and handler panics come back as a failed result. Auditable
    /// tools get exactly one audit entry per call, denied calls included;
    /// if that write fails the call fails with [`SandboxError::Audit`].
    pub async fn execute(
        &self,
        invocation: ToolInvocation<'_>,
    ) -> SandboxResult<ToolExecutionResult> {
        let tool = invocation.tool;
        let start = Instant::now();

        if self.is_denied(&tool.id, invocation.denied) {
            warn!(tool_id = %tool.id, "tool denied by policy");
            let err = SandboxError::Denied {
                tool_id: tool.id.clone(),
            };
            if tool.audit {
                let result = ToolExecutionResult::failed(err.to_string(), 0);
                let entry = audit_entry(tool, invocation.tenant_id, invocation.task_id, &result);
                self.audit.append(entry).await?;
            }
            return Err(err);
        }

        let handler = self
            .handlers
            .get(&tool.id)
            .cloned()
            .ok_or_else(|| SandboxError::NoHandler {
                tool_id: tool.id.clone(),
            })?;

        let policy = Arc::new(SandboxPolicy::from_tool_def(tool)?);
        let limiter = self.limiter(&tool.id, policy.max_concurrent);

        let ctx = ToolContext {
            policy: Arc::clone(&policy),
            tenant_id: invocation.tenant_id.to_string(),
            task_id: invocation.task_id,
        };

        METRICS.inc_tool_invocations();
        let result = {
            let _permit = limiter.acquire_owned().await.ok();
            debug!(tool_id = %tool.id, "tool permit acquired");
            run_handler(handler, ctx, invocation.arguments, start).await
        };

        obs::emit_tool_executed(
            invocation.task_id,
            &tool.id,
            result.success,
            result.duration_ms,
        );

        if tool.audit {
            let entry = audit_entry(tool, invocation.tenant_id, invocation.task_id, &result);
            self.audit.append(entry).await?;
        }
        Ok(result)
    }

    fn limiter(&self, tool_id: &str, max_concurrent: Option<usize>) -> Arc<Semaphore> {
        let mut limiters = self.limiters.lock().unwrap_or_else(|e| e.into_inner());
        let permits = max_concurrent.unwrap_or(self.default_concurrency).max(1);
        Arc::clone(
            limiters
                .entry((tool_id.to_string(), permits))
                .or_insert_with(|| Arc::new(Semaphore::new(permits))),
        )
    }
}

/// Runs the handler on its own task under the policy timeout; a panic
/// fails only this call.
async fn run_handler(
    handler: Arc<dyn ToolHandler>,
    ctx: ToolContext,
    arguments: Value,
    start: Instant,
) -> ToolExecutionResult {
    let policy = Arc::clone(&ctx.policy);
    let mut join = tokio::spawn(async move { handler.invoke(arguments, ctx).await });
    let outcome = tokio::time::timeout(policy.timeout, &mut join).await;
    let elapsed = elapsed_ms(start);

    match outcome {
        Ok(Ok(Ok(output))) => ToolExecutionResult::succeeded(output, elapsed),
        Ok(Ok(Err(err))) => ToolExecutionResult::failed(format!("{err:#}"), elapsed),
        Ok(Err(join_err)) => {
            let reason = if join_err.is_panic() {
                format!("tool '{}' panicked", policy.tool_id)
            } else {
                format!("tool '{}' was cancelled", policy.tool_id)
            };
            ToolExecutionResult::failed(reason, elapsed)
        }
        Err(_elapsed) => {
            join.abort();
            ToolExecutionResult::failed(
                format!(
                    "tool '{}' timed out after {}s",
                    policy.tool_id,
                    policy.timeout.as_secs()
                ),
                elapsed,
            )
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
