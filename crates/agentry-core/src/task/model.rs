//! The task record: one execution of an agent against one input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agentry_state::TaskRecord;

use crate::domain::Message;

use super::error::{TaskError, TaskResult};
use super::state::{TaskState, TaskStateMachine};

/// How a `Done` task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The model produced a response without tool calls.
    Final,
    /// The step budget ran out; output is the last assistant text.
    StepBudgetExhausted,
}

/// Stable classification of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PolicyDenied,
    InputBlocked,
    OutputBlocked,
    RetriesExhausted,
    ApprovalRejected,
    Configuration,
    ToolDenied,
    /// The engine hit an audit, storage or snapshot error mid-run.
    Internal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PolicyDenied => "policy_denied",
            Self::InputBlocked => "input_blocked",
            Self::OutputBlocked => "output_blocked",
            Self::RetriesExhausted => "retries_exhausted",
            Self::ApprovalRejected => "approval_rejected",
            Self::Configuration => "configuration",
            Self::ToolDenied => "tool_denied",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason attached to a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub detail: String,
}

/// One execution of an agent against one input.
///
/// Owned by a single engine run. Once the state is terminal every mutator
/// returns [`TaskError`] and the record is frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    task_id: Uuid,
    tenant_id: String,
    pack_id: String,
    machine: TaskStateMachine,
    step_count: u32,
    messages: Vec<Message>,
    output: Option<String>,
    completion: Option<Completion>,
    failure: Option<TaskFailure>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(tenant_id: impl Into<String>, pack_id: impl Into<String>, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            pack_id: pack_id.into(),
            machine: TaskStateMachine::new(max_retries),
            step_count: 0,
            messages: Vec::new(),
            output: None,
            completion: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.task_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn pack_id(&self) -> &str {
        &self.pack_id
    }

    pub fn state(&self) -> TaskState {
        self.machine.state()
    }

    pub fn retry_count(&self) -> u32 {
        self.machine.retry_count()
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        self.failure.as_ref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn ensure_open(&self, operation: &'static str) -> TaskResult<()> {
        let state = self.state();
        if state.is_terminal() {
            return Err(TaskError::Sealed { state, operation });
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn transition(&mut self, next: TaskState) -> TaskResult<TaskState> {
        let entered = self.machine.transition(next)?;
        self.touch();
        Ok(entered)
    }

    pub fn push_message(&mut self, message: Message) -> TaskResult<()> {
        self.ensure_open("push_message")?;
        self.messages.push(message);
        self.touch();
        Ok(())
    }

    /// Count one tool-executing turn. Returns the new step count.
    pub fn record_step(&mut self) -> TaskResult<u32> {
        self.ensure_open("record_step")?;
        self.step_count += 1;
        self.touch();
        Ok(self.step_count)
    }

    /// Enter `Retry`. If the retry budget is spent the task fails with
    /// `retries_exhausted` carrying `detail`.
    pub fn retry(&mut self, detail: impl Into<String>) -> TaskResult<TaskState> {
        let detail = detail.into();
        let entered = self.machine.transition(TaskState::Retry)?;
        if entered == TaskState::Failed {
            self.failure = Some(TaskFailure {
                kind: FailureKind::RetriesExhausted,
                detail,
            });
        }
        self.touch();
        Ok(entered)
    }

    pub fn complete(&mut self, output: impl Into<String>, completion: Completion) -> TaskResult<()> {
        self.machine.transition(TaskState::Done)?;
        self.output = Some(output.into());
        self.completion = Some(completion);
        self.touch();
        Ok(())
    }

    pub fn fail(&mut self, kind: FailureKind, detail: impl Into<String>) -> TaskResult<()> {
        self.machine.transition(TaskState::Failed)?;
        self.failure = Some(TaskFailure {
            kind,
            detail: detail.into(),
        });
        self.touch();
        Ok(())
    }

    pub fn cancel(&mut self) -> TaskResult<()> {
        self.machine.transition(TaskState::Cancelled)?;
        self.touch();
        Ok(())
    }

    /// Park a retrying task for manual intervention.
    pub fn dead_letter(&mut self, detail: impl Into<String>) -> TaskResult<()> {
        self.machine.transition(TaskState::DeadLetter)?;
        self.failure = Some(TaskFailure {
            kind: FailureKind::RetriesExhausted,
            detail: detail.into(),
        });
        self.touch();
        Ok(())
    }

    /// Text of the most recent assistant message, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::domain::MessageRole::Assistant)
            .map(|m| m.content.as_str())
    }

    /// SHA-256 hex digest of the serialized message history.
    pub fn history_digest(&self) -> Result<String, serde_json::Error> {
        use sha2::Digest as _;
        let bytes = serde_json::to_vec(&self.messages)?;
        Ok(hex::encode(sha2::Sha256::digest(&bytes)))
    }

    /// Snapshot for the persistence collaborator.
    pub fn to_record(&self) -> Result<TaskRecord, serde_json::Error> {
        Ok(TaskRecord {
            task_id: self.task_id,
            tenant_id: self.tenant_id.clone(),
            pack_id: self.pack_id.clone(),
            state: self.state().as_str().to_string(),
            payload: serde_json::to_value(self)?,
            updated_at: self.updated_at,
        })
    }

    /// Rebuild a task from a persisted snapshot.
    pub fn from_record(record: &TaskRecord) -> Result<Self, serde_json::Error> {
        serde_json::from_value(record.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_task() -> Task {
        let mut task = Task::new("acme", "pack", 2);
        task.transition(TaskState::Running).unwrap();
        task
    }

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new("acme", "pack", 3);
        assert_eq!(task.state(), TaskState::Queued);
        assert_eq!(task.step_count(), 0);
        assert!(task.messages().is_empty());
        assert!(task.output().is_none());
        assert!(task.failure().is_none());
    }

    #[test]
    fn test_terminal_task_is_frozen() {
        let mut task = running_task();
        task.push_message(Message::user("hi")).unwrap();
        task.complete("hello", Completion::Final).unwrap();

        assert!(matches!(
            task.push_message(Message::user("again")),
            Err(TaskError::Sealed { .. })
        ));
        assert!(task.record_step().is_err());
        assert!(task.transition(TaskState::Running).is_err());
        assert!(task.fail(FailureKind::PolicyDenied, "late").is_err());
        assert_eq!(task.messages().len(), 1);
        assert!(task.failure().is_none());
    }

    #[test]
    fn test_retry_exhaustion_records_failure() {
        let mut task = running_task();
        for _ in 0..2 {
            assert_eq!(task.retry("provider down").unwrap(), TaskState::Retry);
            task.transition(TaskState::Running).unwrap();
        }
        assert_eq!(task.retry("provider down").unwrap(), TaskState::Failed);
        let failure = task.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::RetriesExhausted);
        assert_eq!(failure.detail, "provider down");
    }

    #[test]
    fn test_record_round_trip() {
        let mut task = running_task();
        task.push_message(Message::user("question")).unwrap();
        task.complete("answer", Completion::StepBudgetExhausted).unwrap();

        let record = task.to_record().unwrap();
        assert_eq!(record.state, "done");
        assert_eq!(record.task_id, task.id());

        let back = Task::from_record(&record).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn test_history_digest_tracks_messages() {
        let mut task = running_task();
        let empty = task.history_digest().unwrap();
        task.push_message(Message::user("hi")).unwrap();
        let one = task.history_digest().unwrap();
        assert_ne!(empty, one);
        assert_eq!(one.len(), 64);
        assert_eq!(one, task.history_digest().unwrap());
    }

    #[test]
    fn test_failure_kind_strings_are_stable() {
        assert_eq!(FailureKind::PolicyDenied.as_str(), "policy_denied");
        assert_eq!(FailureKind::RetriesExhausted.as_str(), "retries_exhausted");
        assert_eq!(FailureKind::Internal.as_str(), "internal");
        let json = serde_json::to_string(&FailureKind::OutputBlocked).unwrap();
        assert_eq!(json, "\"output_blocked\"");
    }
}
