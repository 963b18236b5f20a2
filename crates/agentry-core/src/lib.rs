//! Agentry Core Library
//!
//! A policy-gated, auditable agent execution engine. Re-exports the
//! components a host needs to run agents: the engine itself, the router and
//! its provider contract, the tool sandbox and handler contract, and the
//! guardrail building blocks (policy engine, safety firewall).

pub mod domain;
pub mod engine;
pub mod firewall;
pub mod metrics;
pub mod obs;
pub mod policy;
pub mod router;
pub mod sandbox;
pub mod task;
pub mod telemetry;

pub use domain::{
    AgentConfig, ConfigError, ConfigResult, Message, MessageRole, ModelResponse, RiskLevel,
    ToolCall, ToolDef, ToolSchema,
};

pub use engine::{
    spawn_approval_listener, AgentEngine, EngineConfig, EngineError, EngineResult, PackRegistry,
    RunRequest,
};

pub use firewall::{Firewall, FirewallError, FirewallVerdict, PiiAction, PiiScanner};

pub use policy::{DecisionContext, PolicyDecision, PolicyEngine, PolicyRule, PolicyVerdict, Rule};

pub use router::{
    BreakerConfig, BreakerState, ChatRequest, LlmRouter, ModelProvider, ModelTier, ProviderError,
    RouterConfig, RouterError,
};

pub use sandbox::{
    FilesystemMode, NetworkMode, SandboxError, SandboxPolicy, ToolContext, ToolExecutionResult,
    ToolHandler, ToolInvocation, ToolSandbox,
};

pub use task::{Completion, FailureKind, Task, TaskError, TaskState};

pub use telemetry::init_tracing;

pub use agentry_state::{ApprovalDecision, ApprovalSignal, AuditEntry, AuditSink, TaskStore};
