//! The agent loop: model call, firewall and policy gates, tool dispatch,
//! repeat until a final answer, the step budget, or a terminal verdict.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn, Instrument};
use uuid::Uuid;

use agentry_state::{ApprovalDecision, ApprovalSignal, SuspendedTaskRecord, TaskStore};

use crate::domain::{AgentConfig, Message, ModelResponse, ToolCall, ToolSchema};
use crate::firewall::{Firewall, FirewallVerdict};
use crate::metrics::METRICS;
use crate::obs;
use crate::policy::{DecisionContext, PolicyDecision, PolicyEngine, PolicyVerdict};
use crate::router::{ChatRequest, LlmRouter};
use crate::sandbox::{SandboxError, ToolExecutionResult, ToolInvocation, ToolSandbox};
use crate::task::{Completion, FailureKind, Task, TaskState};

use super::config::EngineConfig;
use super::error::{EngineError, EngineResult};
use super::prompt::system_prompt;

/// One inbound request for an agent run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub tenant_id: String,
    pub input: String,
    /// Prior session messages, placed ahead of the input.
    pub session: Vec<Message>,
}

impl RunRequest {
    pub fn new(tenant_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            input: input.into(),
            session: Vec::new(),
        }
    }

    pub fn with_session(mut self, session: Vec<Message>) -> Self {
        self.session = session;
        self
    }
}

/// An agent configuration compiled for one run.
struct RunPlan<'a> {
    agent: &'a AgentConfig,
    firewall: Firewall,
    policy: PolicyEngine,
    system_prompt: String,
    tools: Vec<ToolSchema>,
}

impl<'a> RunPlan<'a> {
    fn compile(agent: &'a AgentConfig) -> EngineResult<Self> {
        agent.validate()?;
        let guardrails = &agent.guardrails;
        Ok(Self {
            agent,
            firewall: Firewall::from_guardrails(&guardrails.input, &guardrails.output)?,
            policy: PolicyEngine::from_guardrails(&guardrails.input, &guardrails.behavioral),
            system_prompt: system_prompt(agent),
            tools: agent.tool_schemas(),
        })
    }

    fn request(&self, task: &Task) -> ChatRequest {
        ChatRequest {
            system_prompt: self.system_prompt.clone(),
            messages: task.messages().to_vec(),
            tools: self.tools.clone(),
        }
    }

    fn max_steps(&self) -> u32 {
        self.agent.guardrails.behavioral.max_autonomous_steps
    }
}

/// Why the loop stopped.
enum Halt {
    /// The task is in a terminal state.
    Terminal,
    /// The batch needs a human decision before it may run.
    Suspend {
        calls: Vec<ToolCall>,
        decision: PolicyDecision,
    },
}

/// Drives tasks through the agent loop.
///
/// One engine serves every tenant; the router's breakers and the sandbox's
/// limiters are shared by all concurrent runs, while each task's history
/// stays private to its run.
pub struct AgentEngine {
    router: Arc<LlmRouter>,
    sandbox: Arc<ToolSandbox>,
    store: Arc<dyn TaskStore>,
    config: EngineConfig,
}

impl std::fmt::Debug for AgentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentEngine")
            .field("router", &self.router)
            .field("sandbox", &self.sandbox)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AgentEngine {
    pub fn new(
        router: Arc<LlmRouter>,
        sandbox: Arc<ToolSandbox>,
        store: Arc<dyn TaskStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            router,
            sandbox,
            store,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `agent` against `request` to a terminal state or an approval
    /// checkpoint.
    ///
    /// The returned task is terminal, or `AwaitingApproval` when a tool batch
    /// was suspended. Terminal snapshots and suspensions are persisted
    /// through the task store before returning.
    pub async fn run(&self, agent: &AgentConfig, request: RunRequest) -> EngineResult<Task> {
        let (_cancel_tx, cancel) = watch::channel(false);
        self.run_with_cancel(agent, request, cancel).await
    }

    /// [`run`](Self::run) with a cancellation flag, observed before every
    /// model call and tool dispatch.
    #[instrument(skip_all, fields(pack_id = %agent.pack_id))]
    pub async fn run_with_cancel(
        &self,
        agent: &AgentConfig,
        request: RunRequest,
        mut cancel: watch::Receiver<bool>,
    ) -> EngineResult<Task> {
        let plan = RunPlan::compile(agent)?;
        let RunRequest {
            tenant_id,
            input,
            session,
        } = request;

        let mut task = Task::new(tenant_id, agent.pack_id.as_str(), self.config.max_retries);
        task.transition(TaskState::Running)?;
        METRICS.inc_tasks_started();
        obs::emit_task_started(task.id(), task.tenant_id(), task.pack_id());

        let started = Instant::now();
        let span = obs::task_span(task.id(), task.tenant_id());

        let outcome = self
            .start(&plan, &mut task, session, &input, &mut cancel)
            .instrument(span.clone())
            .await;
        let halt = match outcome {
            Ok(halt) => halt,
            Err(err) => return Err(self.abort(task, err, started).instrument(span).await),
        };

        self.settle(task, halt, started).instrument(span).await
    }

    /// Apply an approval decision to a suspended task.
    ///
    /// `agent` must be the configuration of the task's pack. Approval runs
    /// the suspended tool batch and continues the loop; rejection fails the
    /// task with `approval_rejected`.
    pub async fn resume(&self, agent: &AgentConfig, signal: ApprovalSignal) -> EngineResult<Task> {
        let (_cancel_tx, cancel) = watch::channel(false);
        self.resume_with_cancel(agent, signal, cancel).await
    }

    /// [`resume`](Self::resume) with a cancellation flag for the resumed
    /// run, observed like the one given to
    /// [`run_with_cancel`](Self::run_with_cancel).
    pub async fn resume_with_cancel(
        &self,
        agent: &AgentConfig,
        signal: ApprovalSignal,
        cancel: watch::Receiver<bool>,
    ) -> EngineResult<Task> {
        self.resume_with(
            signal,
            |pack_id| (pack_id == agent.pack_id).then_some(agent),
            cancel,
        )
        .await
    }

    /// Cancel a task awaiting approval without running its batch.
    ///
    /// The suspension is removed and the task is persisted as cancelled. A
    /// request from another tenant leaves the suspension in place.
    #[instrument(skip(self))]
    pub async fn cancel_suspended(&self, tenant_id: &str, task_id: Uuid) -> EngineResult<Task> {
        let record = self.store.take_suspended(task_id).await?;
        let mut task = match owned_task(&record, tenant_id) {
            Ok(task) => task,
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "cancel request rejected");
                self.store.save_suspended(record).await?;
                return Err(err);
            }
        };
        task.cancel()?;
        info!(task_id = %task_id, "suspended task cancelled");
        self.settle(task, Halt::Terminal, Instant::now()).await
    }

    /// Ids of this tenant's tasks awaiting approval.
    pub async fn suspended_tasks(&self, tenant_id: &str) -> EngineResult<Vec<Uuid>> {
        Ok(self.store.list_suspended(tenant_id).await?)
    }

    /// Resume with the pack config chosen by `resolve` from the suspended
    /// task's pack id. A signal that fails validation leaves the suspension
    /// in place; once the signal is accepted the task always ends persisted,
    /// as terminal or suspended again.
    #[instrument(skip_all, fields(task_id = %signal.task_id))]
    pub(crate) async fn resume_with<'a>(
        &self,
        signal: ApprovalSignal,
        resolve: impl FnOnce(&str) -> Option<&'a AgentConfig>,
        mut cancel: watch::Receiver<bool>,
    ) -> EngineResult<Task> {
        let record = self.store.take_suspended(signal.task_id).await?;
        let (plan, mut task, calls) = match resume_point(&record, &signal, resolve) {
            Ok(point) => point,
            Err(err) => {
                warn!(task_id = %signal.task_id, error = %err, "approval signal rejected");
                self.store.save_suspended(record).await?;
                return Err(err);
            }
        };

        let ApprovalSignal {
            approver, decision, ..
        } = signal;
        let started = Instant::now();
        let span = obs::task_span(task.id(), task.tenant_id());

        let outcome = self
            .apply_decision(&plan, &mut task, calls, &approver, decision, &mut cancel)
            .instrument(span.clone())
            .await;
        let halt = match outcome {
            Ok(halt) => halt,
            Err(err) => return Err(self.abort(task, err, started).instrument(span).await),
        };

        self.settle(task, halt, started).instrument(span).await
    }

    async fn start(
        &self,
        plan: &RunPlan<'_>,
        task: &mut Task,
        session: Vec<Message>,
        input: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> EngineResult<Halt> {
        for message in session {
            task.push_message(message)?;
        }
        if !self.admit_input(plan, task, input)? {
            return Ok(Halt::Terminal);
        }
        self.drive(plan, task, cancel).await
    }

    async fn apply_decision(
        &self,
        plan: &RunPlan<'_>,
        task: &mut Task,
        calls: Vec<ToolCall>,
        approver: &str,
        decision: ApprovalDecision,
        cancel: &mut watch::Receiver<bool>,
    ) -> EngineResult<Halt> {
        match decision {
            ApprovalDecision::Rejected { reason } => {
                task.fail(
                    FailureKind::ApprovalRejected,
                    format!("rejected by {approver}: {reason}"),
                )?;
                Ok(Halt::Terminal)
            }
            ApprovalDecision::Approved => {
                info!(task_id = %task.id(), approver = %approver, "approval granted");
                task.transition(TaskState::Running)?;
                if let Some(halt) = self.run_tools(plan, task, calls, true, cancel).await? {
                    return Ok(halt);
                }
                self.drive(plan, task, cancel).await
            }
        }
    }

    /// Screen the user input and append it. Returns false when the task
    /// ended here.
    fn admit_input(&self, plan: &RunPlan<'_>, task: &mut Task, input: &str) -> EngineResult<bool> {
        let verdict = plan.firewall.check_input(input);
        if let Some(reason) = verdict.block_reason() {
            METRICS.inc_firewall_blocks();
            obs::emit_firewall_blocked(task.id(), "input", reason);
            task.fail(FailureKind::InputBlocked, reason)?;
            return Ok(false);
        }
        if let FirewallVerdict::Warn { matches } = &verdict {
            warn!(task_id = %task.id(), matches = matches.len(), "PII in input passed through");
        }

        let text = verdict.forwarded(input);
        let decision = plan
            .policy
            .evaluate(&DecisionContext::for_input(text, task.step_count()));
        obs::emit_policy_decided(task.id(), &decision);
        if !decision.is_allowed() {
            // No tool batch to suspend here, so pending fails like a denial.
            METRICS.inc_policy_denials();
            task.fail(FailureKind::PolicyDenied, decision.reason)?;
            return Ok(false);
        }

        task.push_message(Message::user(text))?;
        Ok(true)
    }

    async fn drive(
        &self,
        plan: &RunPlan<'_>,
        task: &mut Task,
        cancel: &mut watch::Receiver<bool>,
    ) -> EngineResult<Halt> {
        loop {
            if is_cancelled(cancel) {
                task.cancel()?;
                return Ok(Halt::Terminal);
            }

            let response = match self.router.chat(plan.agent.model.tier, &plan.request(task)).await {
                Ok(response) => response,
                Err(err) if err.is_configuration() => {
                    task.fail(FailureKind::Configuration, err.to_string())?;
                    return Ok(Halt::Terminal);
                }
                Err(err) => {
                    warn!(task_id = %task.id(), error = %err, "model call failed");
                    if task.retry(err.to_string())? == TaskState::Failed {
                        return Ok(Halt::Terminal);
                    }
                    backoff_or_cancel(self.config.backoff(task.retry_count()), cancel).await;
                    if is_cancelled(cancel) {
                        task.cancel()?;
                        return Ok(Halt::Terminal);
                    }
                    task.transition(TaskState::Running)?;
                    continue;
                }
            };

            let verdict = plan.firewall.check_output(&response.content);
            if let Some(reason) = verdict.block_reason() {
                METRICS.inc_firewall_blocks();
                obs::emit_firewall_blocked(task.id(), "output", reason);
                task.fail(FailureKind::OutputBlocked, reason)?;
                return Ok(Halt::Terminal);
            }

            let ModelResponse {
                content,
                tool_calls,
                ..
            } = response;
            task.push_message(Message::assistant(content.as_str(), tool_calls.clone()))?;

            if tool_calls.is_empty() {
                task.complete(content, Completion::Final)?;
                return Ok(Halt::Terminal);
            }
            if task.step_count() >= plan.max_steps() {
                debug!(task_id = %task.id(), steps = task.step_count(), "step budget exhausted");
                task.complete(content, Completion::StepBudgetExhausted)?;
                return Ok(Halt::Terminal);
            }

            task.record_step()?;
            if let Some(halt) = self.run_tools(plan, task, tool_calls, false, cancel).await? {
                return Ok(halt);
            }
        }
    }

    /// Gate and dispatch one batch of tool calls. `None` means the loop
    /// continues.
    ///
    /// Every call is checked before any runs: a denial ends the task and a
    /// pending verdict suspends the whole batch, unless `approved`.
    async fn run_tools(
        &self,
        plan: &RunPlan<'_>,
        task: &mut Task,
        calls: Vec<ToolCall>,
        approved: bool,
        cancel: &watch::Receiver<bool>,
    ) -> EngineResult<Option<Halt>> {
        let agent = plan.agent;
        let mut pending = None;

        for call in &calls {
            let Some(tool) = agent.tool(&call.name) else {
                continue;
            };

            if self.sandbox.is_denied(&tool.id, &agent.tools.denied) {
                // Goes through the sandbox so the attempt is audited.
                let invocation =
                    ToolInvocation::new(tool, call.arguments.clone(), task.tenant_id(), task.id())
                        .with_denied(&agent.tools.denied);
                if let Err(err @ SandboxError::Audit(_)) = self.sandbox.execute(invocation).await {
                    return Err(err.into());
                }
                METRICS.inc_policy_denials();
                task.fail(
                    FailureKind::ToolDenied,
                    format!("tool '{}' is denied by policy", tool.id),
                )?;
                return Ok(Some(Halt::Terminal));
            }

            let ctx = DecisionContext::for_action(call.name.as_str(), task.step_count())
                .with_input(call.arguments.to_string())
                .with_risk(agent.risk_level.max(tool.risk_level))
                .with_approval_flag(tool.requires_approval);
            let decision = plan.policy.evaluate(&ctx);
            obs::emit_policy_decided(task.id(), &decision);

            match decision.verdict {
                PolicyVerdict::Allow => {}
                PolicyVerdict::Deny => {
                    METRICS.inc_policy_denials();
                    task.fail(FailureKind::PolicyDenied, decision.reason)?;
                    return Ok(Some(Halt::Terminal));
                }
                PolicyVerdict::PendingApproval => {
                    if !approved && pending.is_none() {
                        pending = Some(decision);
                    }
                }
            }
        }

        if let Some(decision) = pending {
            return Ok(Some(Halt::Suspend { calls, decision }));
        }

        if is_cancelled(cancel) {
            task.cancel()?;
            return Ok(Some(Halt::Terminal));
        }

        let task_id = task.id();
        let tenant_id = task.tenant_id().to_string();
        let dispatches = calls.iter().map(|call| {
            let tool = agent.tool(&call.name);
            let tenant_id = tenant_id.as_str();
            async move {
                match tool {
                    Some(tool) => {
                        let invocation =
                            ToolInvocation::new(tool, call.arguments.clone(), tenant_id, task_id)
                                .with_denied(&agent.tools.denied);
                        self.sandbox.execute(invocation).await
                    }
                    None => Ok(ToolExecutionResult::failed(
                        format!("unknown tool '{}'", call.name),
                        0,
                    )),
                }
            }
        });
        let outcomes = join_all(dispatches).await;

        if is_cancelled(cancel) {
            debug!(task_id = %task_id, "cancelled during dispatch; discarding tool results");
            task.cancel()?;
            return Ok(Some(Halt::Terminal));
        }

        for (call, outcome) in calls.iter().zip(outcomes) {
            let result = match outcome {
                Ok(result) => result,
                Err(SandboxError::Denied { tool_id }) => {
                    task.fail(
                        FailureKind::ToolDenied,
                        format!("tool '{tool_id}' is denied by policy"),
                    )?;
                    return Ok(Some(Halt::Terminal));
                }
                Err(err) if err.is_configuration() => {
                    task.fail(FailureKind::Configuration, err.to_string())?;
                    return Ok(Some(Halt::Terminal));
                }
                Err(err) => return Err(err.into()),
            };
            let content = screen_tool_result(plan, task_id, serde_json::to_string(&result)?);
            task.push_message(Message::tool(call.id.as_str(), content))?;
        }
        Ok(None)
    }

    /// Fail and persist a task whose run hit an engine error, then wrap the
    /// error with the task id.
    async fn abort(&self, mut task: Task, err: EngineError, started: Instant) -> EngineError {
        let task_id = task.id();
        warn!(task_id = %task_id, error = %err, "run aborted on engine error");

        if !task.state().is_terminal() {
            if let Err(fail_err) = task.fail(FailureKind::Internal, err.to_string()) {
                warn!(task_id = %task_id, error = %fail_err, "could not fail aborted task");
            }
        }
        if task.state().is_terminal() {
            match task.to_record() {
                Ok(record) => {
                    if let Err(save_err) = self.store.save_terminal(record).await {
                        warn!(task_id = %task_id, error = %save_err, "aborted task not persisted");
                    }
                }
                Err(ser_err) => {
                    warn!(task_id = %task_id, error = %ser_err, "aborted task not serializable");
                }
            }
            obs::emit_task_finished(
                task_id,
                task.state(),
                task.step_count(),
                u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            );
        }

        EngineError::Aborted {
            task_id,
            source: Box::new(err),
        }
    }

    async fn settle(&self, mut task: Task, halt: Halt, started: Instant) -> EngineResult<Task> {
        match halt {
            Halt::Terminal => {
                self.store.save_terminal(task.to_record()?).await?;
                obs::emit_task_finished(
                    task.id(),
                    task.state(),
                    task.step_count(),
                    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                );
            }
            Halt::Suspend { calls, decision } => {
                task.transition(TaskState::AwaitingApproval)?;
                let record = SuspendedTaskRecord {
                    task: task.to_record()?,
                    pending_calls: serde_json::to_value(&calls)?,
                    reason: decision.reason.clone(),
                    rule_id: decision.rule_id.clone(),
                    history_digest: task.history_digest()?,
                    suspended_at: Utc::now(),
                };
                self.store.save_suspended(record).await?;
                obs::emit_task_suspended(task.id(), &decision.rule_id, &decision.reason);
            }
        }
        Ok(task)
    }
}

/// Validate a signal against its suspension record and rebuild the run.
fn resume_point<'a>(
    record: &SuspendedTaskRecord,
    signal: &ApprovalSignal,
    resolve: impl FnOnce(&str) -> Option<&'a AgentConfig>,
) -> EngineResult<(RunPlan<'a>, Task, Vec<ToolCall>)> {
    let task_id = record.task.task_id;
    if record.task.tenant_id != signal.tenant_id {
        return Err(EngineError::TenantMismatch {
            task_id,
            owner: record.task.tenant_id.clone(),
            tenant_id: signal.tenant_id.clone(),
        });
    }

    let agent = resolve(&record.task.pack_id).ok_or_else(|| EngineError::UnknownPack {
        task_id,
        pack_id: record.task.pack_id.clone(),
    })?;
    let plan = RunPlan::compile(agent)?;

    let task = Task::from_record(&record.task)?;
    if task.history_digest()? != record.history_digest {
        return Err(EngineError::DigestMismatch { task_id });
    }
    let calls = serde_json::from_value(record.pending_calls.clone())?;
    Ok((plan, task, calls))
}

/// Rebuild a suspended task on behalf of `tenant_id`.
fn owned_task(record: &SuspendedTaskRecord, tenant_id: &str) -> EngineResult<Task> {
    if record.task.tenant_id != tenant_id {
        return Err(EngineError::TenantMismatch {
            task_id: record.task.task_id,
            owner: record.task.tenant_id.clone(),
            tenant_id: tenant_id.to_string(),
        });
    }
    Ok(Task::from_record(&record.task)?)
}

/// Tool output goes back to the model, so it passes the input pipeline.
fn screen_tool_result(plan: &RunPlan<'_>, task_id: Uuid, content: String) -> String {
    match plan.firewall.check_input(&content) {
        FirewallVerdict::Block { reason, .. } => {
            METRICS.inc_firewall_blocks();
            obs::emit_firewall_blocked(task_id, "tool_result", &reason);
            serde_json::json!({
                "success": false,
                "error": format!("tool result withheld: {reason}"),
            })
            .to_string()
        }
        FirewallVerdict::Redact { text, .. } => text,
        _ => content,
    }
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow()
}

/// Wait out a retry backoff, returning early once the flag is raised. With
/// the sender gone the flag can no longer change, so the full delay runs.
async fn backoff_or_cancel(delay: Duration, cancel: &mut watch::Receiver<bool>) {
    let deadline = Instant::now() + delay;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return,
            changed = cancel.changed() => match changed {
                Ok(()) if is_cancelled(cancel) => return,
                Ok(()) => {}
                Err(_) => {
                    tokio::time::sleep_until(deadline).await;
                    return;
                }
            },
        }
    }
}
