//! Task lifecycle: the finite state machine and the task record it guards.
//!
//! - [`state`]: `TaskState` + `TaskStateMachine` (legal edges, retry budget)
//! - [`model`]: `Task`, the exclusively-owned execution record
//! - [`error`]: `TaskError` / `TaskResult`

pub mod error;
pub mod model;
pub mod state;

pub use error::{TaskError, TaskResult};
pub use model::{Completion, FailureKind, Task, TaskFailure};
pub use state::{TaskState, TaskStateMachine};
