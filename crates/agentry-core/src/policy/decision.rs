//! Policy verdicts and decisions.

use serde::{Deserialize, Serialize};

/// Outcome class of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyVerdict {
    Allow,
    Deny,
    /// Suspend until a human approves.
    PendingApproval,
}

/// Immutable result of evaluating one rule or a whole rule list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub verdict: PolicyVerdict,
    pub reason: String,
    /// Id of the rule that produced this decision; empty for the default allow.
    pub rule_id: String,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            verdict: PolicyVerdict::Allow,
            reason: String::new(),
            rule_id: String::new(),
        }
    }

    pub fn deny(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            verdict: PolicyVerdict::Deny,
            reason: reason.into(),
            rule_id: rule_id.into(),
        }
    }

    pub fn pending_approval(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            verdict: PolicyVerdict::PendingApproval,
            reason: reason.into(),
            rule_id: rule_id.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict == PolicyVerdict::Allow
    }

    pub fn is_denied(&self) -> bool {
        self.verdict == PolicyVerdict::Deny
    }

    pub fn is_pending(&self) -> bool {
        self.verdict == PolicyVerdict::PendingApproval
    }
}
