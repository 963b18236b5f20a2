//! Policy rules: single-method evaluators over a [`DecisionContext`].

use serde::{Deserialize, Serialize};

use crate::domain::RiskLevel;

use super::context::DecisionContext;
use super::decision::{PolicyDecision, PolicyVerdict};

/// A rule maps a decision context to a decision.
///
/// Implement this for rules that cannot be expressed as a [`PolicyRule`].
pub trait Rule: Send + Sync + std::fmt::Debug {
    /// Stable identifier recorded on decisions this rule produces.
    fn id(&self) -> &str;

    fn evaluate(&self, context: &DecisionContext) -> PolicyDecision;
}

/// Built-in rules, configurable from a pack's guardrails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyRule {
    /// Deny inputs longer than `max_length` characters.
    InputLength { max_length: usize },
    /// Deny actions containing any of `patterns` (case-insensitive).
    ProhibitedAction { patterns: Vec<String> },
    /// Deny steps past the budget.
    MaxSteps { max_steps: u32 },
    /// Require approval when the declared risk level is in the set.
    RiskGate { require_approval_for: Vec<RiskLevel> },
    /// Require approval for tools flagged `requires_approval`.
    ApprovalFlag,
    /// Generic action match yielding a fixed verdict.
    ActionMatch {
        pattern: String,
        verdict: PolicyVerdict,
        reason: String,
    },
}

impl Rule for PolicyRule {
    fn id(&self) -> &str {
        match self {
            PolicyRule::InputLength { .. } => "input_length",
            PolicyRule::ProhibitedAction { .. } => "prohibited_actions",
            PolicyRule::MaxSteps { .. } => "max_steps",
            PolicyRule::RiskGate { .. } => "risk_level",
            PolicyRule::ApprovalFlag => "tool_requires_approval",
            PolicyRule::ActionMatch { .. } => "action_rule",
        }
    }

    fn evaluate(&self, ctx: &DecisionContext) -> PolicyDecision {
        match self {
            PolicyRule::InputLength { max_length } => {
                let len = ctx.input_text.chars().count();
                if len > *max_length {
                    return PolicyDecision::deny(
                        self.id(),
                        format!("input length {len} exceeds max {max_length}"),
                    );
                }
            }
            PolicyRule::ProhibitedAction { patterns } => {
                if let Some(action) = ctx.action.as_deref() {
                    let action = action.to_lowercase();
                    let hit = patterns
                        .iter()
                        .filter(|p| !p.is_empty())
                        .find(|p| action.contains(&p.to_lowercase()));
                    if let Some(p) = hit {
                        return PolicyDecision::deny(
                            self.id(),
                            format!("action contains prohibited pattern: {p}"),
                        );
                    }
                }
            }
            PolicyRule::MaxSteps { max_steps } => {
                if ctx.current_step > *max_steps {
                    return PolicyDecision::deny(
                        self.id(),
                        format!("step {} exceeds max {max_steps}", ctx.current_step),
                    );
                }
            }
            PolicyRule::RiskGate {
                require_approval_for,
            } => {
                if let Some(level) = ctx.risk_level {
                    if require_approval_for.contains(&level) {
                        return PolicyDecision::pending_approval(
                            self.id(),
                            format!("risk level '{level}' requires human approval"),
                        );
                    }
                }
            }
            PolicyRule::ApprovalFlag => {
                if ctx.requires_approval {
                    let action = ctx.action.as_deref().unwrap_or("action");
                    return PolicyDecision::pending_approval(
                        self.id(),
                        format!("{action} is flagged as requiring approval"),
                    );
                }
            }
            PolicyRule::ActionMatch {
                pattern,
                verdict,
                reason,
            } => {
                let matched = ctx
                    .action
                    .as_deref()
                    .is_some_and(|a| !pattern.is_empty() && a.contains(pattern.as_str()));
                if matched {
                    let reason = if reason.is_empty() {
                        format!("action matched pattern: {pattern}")
                    } else {
                        reason.clone()
                    };
                    return PolicyDecision {
                        verdict: *verdict,
                        reason,
                        rule_id: self.id().to_string(),
                    };
                }
            }
        }
        PolicyDecision::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_length_counts_chars() {
        let rule = PolicyRule::InputLength { max_length: 3 };
        assert!(rule.evaluate(&DecisionContext::for_input("äöü", 0)).is_allowed());

        let decision = rule.evaluate(&DecisionContext::for_input("abcd", 0));
        assert!(decision.is_denied());
        assert_eq!(decision.rule_id, "input_length");
        assert!(decision.reason.contains("exceeds max 3"));
    }

    #[test]
    fn test_prohibited_action_substring() {
        let rule = PolicyRule::ProhibitedAction {
            patterns: vec!["delete".into()],
        };
        let decision = rule.evaluate(&DecisionContext::for_action("db.DELETE_table", 0));
        assert!(decision.is_denied());
        assert!(decision.reason.contains("delete"));

        assert!(rule
            .evaluate(&DecisionContext::for_action("db.read", 0))
            .is_allowed());
        assert!(rule.evaluate(&DecisionContext::for_input("delete", 0)).is_allowed());
    }

    #[test]
    fn test_max_steps_is_exclusive_ceiling() {
        let rule = PolicyRule::MaxSteps { max_steps: 5 };
        assert!(rule.evaluate(&DecisionContext::for_input("", 5)).is_allowed());
        assert!(rule.evaluate(&DecisionContext::for_input("", 6)).is_denied());
    }

    #[test]
    fn test_risk_gate_requires_approval() {
        let rule = PolicyRule::RiskGate {
            require_approval_for: vec![RiskLevel::High],
        };
        let ctx = DecisionContext::for_action("wire_transfer", 0).with_risk(RiskLevel::High);
        let decision = rule.evaluate(&ctx);
        assert!(decision.is_pending());
        assert!(decision.reason.contains("'high'"));

        let ctx = DecisionContext::for_action("lookup", 0).with_risk(RiskLevel::Low);
        assert!(rule.evaluate(&ctx).is_allowed());
        assert!(rule.evaluate(&DecisionContext::default()).is_allowed());
    }

    #[test]
    fn test_approval_flag() {
        let ctx = DecisionContext::for_action("refund", 1).with_approval_flag(true);
        assert!(PolicyRule::ApprovalFlag.evaluate(&ctx).is_pending());
    }

    #[test]
    fn test_action_match_custom_verdict() {
        let rule = PolicyRule::ActionMatch {
            pattern: "export".into(),
            verdict: PolicyVerdict::PendingApproval,
            reason: String::new(),
        };
        let decision = rule.evaluate(&DecisionContext::for_action("crm.export", 0));
        assert!(decision.is_pending());
        assert_eq!(decision.reason, "action matched pattern: export");
    }

    #[test]
    fn test_rule_serde_roundtrip() {
        let rules = vec![
            PolicyRule::InputLength { max_length: 10 },
            PolicyRule::RiskGate {
                require_approval_for: vec![RiskLevel::Critical],
            },
            PolicyRule::ApprovalFlag,
        ];
        let json = serde_json::to_string(&rules).unwrap();
        let back: Vec<PolicyRule> = serde_json::from_str(&json).unwrap();
        assert_eq!(rules, back);
    }
}
