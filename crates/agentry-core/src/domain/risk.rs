//! Risk levels declared by packs and tools.

use serde::{Deserialize, Serialize};

/// Risk level assigned to an agent pack or a tool.
///
/// The policy engine routes configured levels to a human approval checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Levels that require approval when a pack does not say otherwise.
    pub fn default_approval_set() -> Vec<RiskLevel> {
        vec![Self::High, Self::Critical]
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Low
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}
