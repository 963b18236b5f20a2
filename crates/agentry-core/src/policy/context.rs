//! Per-turn decision context.

use serde::{Deserialize, Serialize};

use crate::domain::RiskLevel;

/// Facts the policy engine and firewall see for one decision.
///
/// Rebuilt every turn; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub input_text: String,
    /// Proposed action or tool id; `None` before a model call.
    pub action: Option<String>,
    pub risk_level: Option<RiskLevel>,
    /// Zero-based index of the step about to run.
    pub current_step: u32,
    /// The tool itself is flagged as requiring approval.
    pub requires_approval: bool,
}

impl DecisionContext {
    pub fn for_input(input_text: impl Into<String>, current_step: u32) -> Self {
        Self {
            input_text: input_text.into(),
            current_step,
            ..Self::default()
        }
    }

    pub fn for_action(action: impl Into<String>, current_step: u32) -> Self {
        Self {
            action: Some(action.into()),
            current_step,
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input_text: impl Into<String>) -> Self {
        self.input_text = input_text.into();
        self
    }

    pub fn with_risk(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = Some(risk_level);
        self
    }

    pub fn with_approval_flag(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }
}
