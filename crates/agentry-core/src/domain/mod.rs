//! Domain models for Agentry.
//!
//! Canonical definitions shared by every component:
//! - `AgentConfig`: pack-derived agent configuration for one tenant
//! - `Message` / `ToolCall` / `ModelResponse`: conversation vocabulary
//! - `RiskLevel`: risk classification used by approval gating

pub mod agent_config;
pub mod error;
pub mod message;
pub mod risk;

pub use agent_config::{
    AgentConfig, BehavioralGuardrails, Guardrails, InputGuardrails, ModelPreference,
    OutputGuardrails, PiiDetection, Role, Soul, ToolDef, ToolSandboxSpec, Tools,
};
pub use error::{ConfigError, ConfigResult};
pub use message::{Message, MessageRole, ModelResponse, ToolCall, ToolSchema};
pub use risk::RiskLevel;
