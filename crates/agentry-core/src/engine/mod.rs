//! Agent execution engine: the composition root.
//!
//! Each run compiles the agent's guardrails into a firewall and a policy
//! engine, then loops: model call through the router, output firewall, tool
//! call gating, concurrent dispatch through the sandbox. The loop ends on a
//! final answer, the step budget, a terminal verdict or cancellation.
//! Batches needing human approval are persisted and resumed later from an
//! [`ApprovalSignal`](agentry_state::ApprovalSignal).

pub mod approval;
pub mod config;
pub mod error;
pub mod prompt;
pub mod runtime;

pub use approval::{spawn_approval_listener, PackRegistry};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use prompt::system_prompt;
pub use runtime::{AgentEngine, RunRequest};
