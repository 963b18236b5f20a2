//! Task lifecycle states and the transition table.

use serde::{Deserialize, Serialize};

use super::error::{TaskError, TaskResult};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Retry,
    /// Suspended on a human approval checkpoint.
    AwaitingApproval,
    Done,
    Failed,
    Cancelled,
    DeadLetter,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::Failed | Self::Cancelled | Self::DeadLetter
        )
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Done)
                | (Running, Retry)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Running, AwaitingApproval)
                | (Retry, Running)
                | (Retry, Failed)
                | (Retry, Cancelled)
                | (Retry, DeadLetter)
                | (AwaitingApproval, Running)
                | (AwaitingApproval, Failed)
                | (AwaitingApproval, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Retry => "retry",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::DeadLetter => "dead_letter",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enforces legal transitions and tracks the retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStateMachine {
    state: TaskState,
    max_retries: u32,
    retry_count: u32,
}

impl TaskStateMachine {
    pub fn new(max_retries: u32) -> Self {
        Self {
            state: TaskState::Queued,
            max_retries,
            retry_count: 0,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Move to `next`, returning the state actually entered.
    ///
    /// Entering `Retry` consumes one retry; once the count exceeds
    /// `max_retries` the machine enters `Failed` instead.
    pub fn transition(&mut self, next: TaskState) -> TaskResult<TaskState> {
        if self.state.is_terminal() {
            return Err(TaskError::FromTerminal {
                from: self.state,
                to: next,
            });
        }
        if !self.state.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        if next == TaskState::Retry {
            self.retry_count += 1;
            if self.retry_count > self.max_retries {
                self.state = TaskState::Failed;
                return Ok(self.state);
            }
        }

        self.state = next;
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskState; 8] = [
        TaskState::Queued,
        TaskState::Running,
        TaskState::Retry,
        TaskState::AwaitingApproval,
        TaskState::Done,
        TaskState::Failed,
        TaskState::Cancelled,
        TaskState::DeadLetter,
    ];

    #[test]
    fn test_starts_queued() {
        let sm = TaskStateMachine::new(3);
        assert_eq!(sm.state(), TaskState::Queued);
        assert_eq!(sm.retry_count(), 0);
    }

    #[test]
    fn test_happy_path() {
        let mut sm = TaskStateMachine::new(3);
        assert_eq!(sm.transition(TaskState::Running).unwrap(), TaskState::Running);
        assert_eq!(sm.transition(TaskState::Done).unwrap(), TaskState::Done);
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for terminal in ALL.into_iter().filter(|s| s.is_terminal()) {
            for next in ALL {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} -> {next} must be illegal"
                );
            }
        }
    }

    #[test]
    fn test_done_rejects_running() {
        let mut sm = TaskStateMachine::new(3);
        sm.transition(TaskState::Running).unwrap();
        sm.transition(TaskState::Done).unwrap();

        let err = sm.transition(TaskState::Running).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("done"));
        assert!(msg.contains("running"));
        assert!(matches!(err, TaskError::FromTerminal { .. }));
        assert_eq!(sm.state(), TaskState::Done);
    }

    #[test]
    fn test_illegal_edge_names_both_states() {
        let mut sm = TaskStateMachine::new(3);
        let err = sm.transition(TaskState::Done).unwrap_err();
        assert_eq!(
            err,
            TaskError::InvalidTransition {
                from: TaskState::Queued,
                to: TaskState::Done
            }
        );
        assert!(err.to_string().contains("queued -> done"));
    }

    #[test]
    fn test_retry_budget_redirects_to_failed() {
        let mut sm = TaskStateMachine::new(2);
        sm.transition(TaskState::Running).unwrap();

        for expected in 1..=2 {
            assert_eq!(sm.transition(TaskState::Retry).unwrap(), TaskState::Retry);
            assert_eq!(sm.retry_count(), expected);
            sm.transition(TaskState::Running).unwrap();
        }

        assert_eq!(sm.transition(TaskState::Retry).unwrap(), TaskState::Failed);
        assert!(sm.state().is_terminal());
    }

    #[test]
    fn test_zero_retries_fails_immediately() {
        let mut sm = TaskStateMachine::new(0);
        sm.transition(TaskState::Running).unwrap();
        assert_eq!(sm.transition(TaskState::Retry).unwrap(), TaskState::Failed);
    }

    #[test]
    fn test_retry_can_dead_letter() {
        let mut sm = TaskStateMachine::new(3);
        sm.transition(TaskState::Running).unwrap();
        sm.transition(TaskState::Retry).unwrap();
        assert_eq!(
            sm.transition(TaskState::DeadLetter).unwrap(),
            TaskState::DeadLetter
        );
    }

    #[test]
    fn test_awaiting_approval_edges() {
        let mut sm = TaskStateMachine::new(3);
        sm.transition(TaskState::Running).unwrap();
        sm.transition(TaskState::AwaitingApproval).unwrap();
        assert!(!TaskState::AwaitingApproval.is_terminal());
        assert!(sm.transition(TaskState::Done).is_err());
        assert_eq!(sm.transition(TaskState::Running).unwrap(), TaskState::Running);
    }
}
