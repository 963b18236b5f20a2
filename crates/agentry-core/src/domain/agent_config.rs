//! Pack-derived agent configuration.
//!
//! An `AgentConfig` is the already-merged result of a pack's composable
//! layers (soul, role, tools, guardrails). Loading and merging happen outside
//! this crate; here the config is only validated and consumed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::firewall::PiiAction;
use crate::router::ModelTier;
use crate::sandbox::{FilesystemMode, NetworkMode};

use super::error::{ConfigError, ConfigResult};
use super::message::ToolSchema;
use super::risk::RiskLevel;

/// Fully assembled agent configuration for one pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub pack_id: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_pack_risk")]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub soul: Soul,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub model: ModelPreference,
    #[serde(default)]
    pub tools: Tools,
    #[serde(default)]
    pub guardrails: Guardrails,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_pack_risk() -> RiskLevel {
    RiskLevel::Medium
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Soul {
    pub name: String,
    pub tone: String,
    pub principles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Role {
    pub title: String,
    pub domain: String,
    pub goal: String,
    pub backstory: String,
    pub limitations: Vec<String>,
}

/// Which capability tier the agent asks the router for.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPreference {
    /// `None` uses the router's default tier.
    pub tier: Option<ModelTier>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tools {
    pub available: Vec<ToolDef>,
    /// Tool ids this pack must never execute, even if declared.
    pub denied: Vec<String>,
}

/// A tool the agent may call, with its sandbox requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_parameters")]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub sandbox: ToolSandboxSpec,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default = "default_audit")]
    pub audit: bool,
}

fn default_parameters() -> serde_json::Value {
    serde_json::json!({"type": "object"})
}

fn default_audit() -> bool {
    true
}

impl ToolDef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            parameters: default_parameters(),
            sandbox: ToolSandboxSpec::default(),
            risk_level: RiskLevel::Low,
            requires_approval: false,
            audit: true,
        }
    }

    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.id.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Declared sandbox requirements for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSandboxSpec {
    pub timeout_secs: u64,
    /// Memory ceiling such as `"256Mi"` or `"1GB"`.
    pub memory: Option<String>,
    /// CPU ceiling in cores.
    pub cpu: Option<f64>,
    pub network: NetworkMode,
    pub egress_allowlist: Vec<String>,
    pub filesystem: FilesystemMode,
    pub scoped_paths: Vec<String>,
    /// Simultaneous in-flight calls of this tool; sandbox default when absent.
    pub max_concurrent: Option<usize>,
}

impl Default for ToolSandboxSpec {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            memory: None,
            cpu: None,
            network: NetworkMode::None,
            egress_allowlist: Vec::new(),
            filesystem: FilesystemMode::Scoped,
            scoped_paths: Vec::new(),
            max_concurrent: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Guardrails {
    pub input: InputGuardrails,
    pub output: OutputGuardrails,
    pub behavioral: BehavioralGuardrails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputGuardrails {
    /// Ceiling in characters.
    pub max_length: usize,
    pub jailbreak_detection: bool,
    pub pii_detection: PiiDetection,
}

impl Default for InputGuardrails {
    fn default() -> Self {
        Self {
            max_length: 50_000,
            jailbreak_detection: true,
            pii_detection: PiiDetection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PiiDetection {
    pub enabled: bool,
    pub action: PiiAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputGuardrails {
    /// Ceiling in characters.
    pub max_length: usize,
    pub pii_check: bool,
}

impl Default for OutputGuardrails {
    fn default() -> Self {
        Self {
            max_length: 100_000,
            pii_check: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralGuardrails {
    pub prohibited_actions: Vec<String>,
    pub required_disclaimers: Vec<String>,
    pub max_autonomous_steps: u32,
    /// Risk levels routed to a human approval checkpoint.
    pub approval_required_for: Vec<RiskLevel>,
}

impl Default for BehavioralGuardrails {
    fn default() -> Self {
        Self {
            prohibited_actions: Vec::new(),
            required_disclaimers: Vec::new(),
            max_autonomous_steps: 10,
            approval_required_for: RiskLevel::default_approval_set(),
        }
    }
}

impl AgentConfig {
    /// Minimal config with defaults everywhere.
    pub fn new(pack_id: impl Into<String>) -> Self {
        Self {
            pack_id: pack_id.into(),
            version: default_version(),
            risk_level: default_pack_risk(),
            soul: Soul::default(),
            role: Role::default(),
            model: ModelPreference::default(),
            tools: Tools::default(),
            guardrails: Guardrails::default(),
        }
    }

    /// Reject configurations the engine cannot run safely.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.pack_id.trim().is_empty() {
            return Err(ConfigError::EmptyPackId);
        }

        let mut seen = HashSet::new();
        for tool in &self.tools.available {
            if !seen.insert(tool.id.as_str()) {
                return Err(ConfigError::DuplicateTool(tool.id.clone()));
            }
            if tool.id.trim().is_empty() {
                return Err(ConfigError::InvalidTool {
                    tool_id: tool.id.clone(),
                    reason: "id must not be empty".into(),
                });
            }
            if tool.sandbox.timeout_secs == 0 {
                return Err(ConfigError::InvalidTool {
                    tool_id: tool.id.clone(),
                    reason: "timeout_secs must be positive".into(),
                });
            }
            if tool.sandbox.max_concurrent == Some(0) {
                return Err(ConfigError::InvalidTool {
                    tool_id: tool.id.clone(),
                    reason: "max_concurrent must be positive".into(),
                });
            }
        }

        if self.guardrails.behavioral.max_autonomous_steps == 0 {
            return Err(ConfigError::InvalidGuardrail(
                "max_autonomous_steps must be positive".into(),
            ));
        }
        if self.guardrails.input.max_length == 0 || self.guardrails.output.max_length == 0 {
            return Err(ConfigError::InvalidGuardrail(
                "length ceilings must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Look up a declared tool by id.
    pub fn tool(&self, tool_id: &str) -> Option<&ToolDef> {
        self.tools.available.iter().find(|t| t.id == tool_id)
    }

    pub fn is_tool_denied(&self, tool_id: &str) -> bool {
        self.tools.denied.iter().any(|d| d == tool_id)
    }

    /// Schemas advertised to the model; denied tools are never advertised.
    pub fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .available
            .iter()
            .filter(|t| !self.is_tool_denied(&t.id))
            .map(ToolDef::schema)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_fail_safe() {
        let cfg = AgentConfig::new("pack");
        assert!(cfg.guardrails.input.jailbreak_detection);
        assert!(!cfg.guardrails.input.pii_detection.enabled);
        assert!(cfg.guardrails.output.pii_check);
        assert_eq!(cfg.guardrails.behavioral.max_autonomous_steps, 10);

        let tool = ToolDef::new("search", "Search");
        assert!(tool.audit);
        assert_eq!(tool.sandbox.network, NetworkMode::None);
        assert_eq!(tool.sandbox.timeout_secs, 30);
    }

    #[test]
    fn test_validate_rejects_duplicate_tools() {
        let mut cfg = AgentConfig::new("pack");
        cfg.tools.available = vec![ToolDef::new("a", "A"), ToolDef::new("a", "A again")];
        assert!(matches!(cfg.validate(), Err(ConfigError::DuplicateTool(id)) if id == "a"));
    }

    #[test]
    fn test_validate_rejects_zero_step_budget() {
        let mut cfg = AgentConfig::new("pack");
        cfg.guardrails.behavioral.max_autonomous_steps = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidGuardrail(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_pack_id() {
        assert!(matches!(
            AgentConfig::new("  ").validate(),
            Err(ConfigError::EmptyPackId)
        ));
    }

    #[test]
    fn test_denied_tools_not_advertised() {
        let mut cfg = AgentConfig::new("pack");
        cfg.tools.available = vec![ToolDef::new("a", "A"), ToolDef::new("b", "B")];
        cfg.tools.denied = vec!["b".into()];
        let names: Vec<String> = cfg.tool_schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a".to_string()]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: AgentConfig = serde_json::from_value(serde_json::json!({
            "pack_id": "support",
            "tools": {"available": [{"id": "kb", "name": "Knowledge base"}]},
            "guardrails": {"input": {"pii_detection": {"enabled": true, "action": "redact"}}}
        }))
        .unwrap();
        assert_eq!(cfg.risk_level, RiskLevel::Medium);
        assert_eq!(cfg.guardrails.input.max_length, 50_000);
        assert_eq!(cfg.guardrails.input.pii_detection.action, PiiAction::Redact);
        assert!(cfg.tool("kb").unwrap().audit);
        cfg.validate().unwrap();
    }
}
