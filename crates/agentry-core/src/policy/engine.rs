//! Ordered policy evaluation; the first non-allow verdict wins.

use std::sync::Arc;

use crate::domain::{BehavioralGuardrails, InputGuardrails};

use super::context::DecisionContext;
use super::decision::PolicyDecision;
use super::rules::{PolicyRule, Rule};

/// Ordered rule list evaluated with short-circuiting.
///
/// Built once per agent configuration; rules are never mutated while tasks
/// evaluate against it, so the engine can be shared freely.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    rules: Vec<Arc<dyn Rule>>,
}

impl PolicyEngine {
    /// An empty engine (everything allowed).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule and return `self` (builder pattern).
    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate `context` against every rule in order.
    ///
    /// The first `Deny` or `PendingApproval` decision is returned without
    /// consulting later rules.
    pub fn evaluate(&self, context: &DecisionContext) -> PolicyDecision {
        for rule in &self.rules {
            let decision = rule.evaluate(context);
            if !decision.is_allowed() {
                tracing::debug!(
                    rule_id = %decision.rule_id,
                    verdict = ?decision.verdict,
                    reason = %decision.reason,
                    "policy short-circuit"
                );
                return decision;
            }
        }
        PolicyDecision::allow()
    }

    /// The standard rule list for a pack's guardrails.
    ///
    /// | Order | Rule               | Verdict on match  |
    /// |-------|--------------------|-------------------|
    /// | 1     | input length       | deny              |
    /// | 2     | prohibited actions | deny              |
    /// | 3     | step budget        | deny              |
    /// | 4     | risk level gate    | pending approval  |
    /// | 5     | tool approval flag | pending approval  |
    pub fn from_guardrails(input: &InputGuardrails, behavioral: &BehavioralGuardrails) -> Self {
        let mut engine = Self::new().with_rule(PolicyRule::InputLength {
            max_length: input.max_length,
        });

        if !behavioral.prohibited_actions.is_empty() {
            engine = engine.with_rule(PolicyRule::ProhibitedAction {
                patterns: behavioral.prohibited_actions.clone(),
            });
        }

        // The agent loop ends at the budget before judging a step past it, so
        // inside the engine this rule never fires; it binds callers that
        // evaluate contexts directly.
        engine = engine.with_rule(PolicyRule::MaxSteps {
            max_steps: behavioral.max_autonomous_steps,
        });

        if !behavioral.approval_required_for.is_empty() {
            engine = engine.with_rule(PolicyRule::RiskGate {
                require_approval_for: behavioral.approval_required_for.clone(),
            });
        }

        engine.with_rule(PolicyRule::ApprovalFlag)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::domain::RiskLevel;
    use crate::policy::decision::PolicyVerdict;

    /// Rule with a fixed verdict that counts how often it was consulted.
    #[derive(Debug)]
    struct Fixed {
        id: &'static str,
        verdict: PolicyVerdict,
        calls: Arc<AtomicUsize>,
    }

    impl Fixed {
        fn new(id: &'static str, verdict: PolicyVerdict) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    id,
                    verdict,
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl Rule for Fixed {
        fn id(&self) -> &str {
            self.id
        }

        fn evaluate(&self, _context: &DecisionContext) -> PolicyDecision {
            self.calls.fetch_add(1, Ordering::SeqCst);
            PolicyDecision {
                verdict: self.verdict,
                reason: format!("{} says {:?}", self.id, self.verdict),
                rule_id: self.id.to_string(),
            }
        }
    }

    #[test]
    fn test_empty_engine_allows() {
        let engine = PolicyEngine::new();
        assert!(engine.evaluate(&DecisionContext::default()).is_allowed());
    }

    #[test]
    fn test_first_non_allow_wins_and_later_rules_are_skipped() {
        let (a, a_calls) = Fixed::new("A", PolicyVerdict::Allow);
        let (b, b_calls) = Fixed::new("B", PolicyVerdict::Deny);
        let (c, c_calls) = Fixed::new("C", PolicyVerdict::Deny);
        let engine = PolicyEngine::new().with_rule(a).with_rule(b).with_rule(c);

        let decision = engine.evaluate(&DecisionContext::default());
        assert_eq!(decision.rule_id, "B");
        assert!(decision.is_denied());
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pending_approval_short_circuits() {
        let (a, _) = Fixed::new("A", PolicyVerdict::PendingApproval);
        let (b, b_calls) = Fixed::new("B", PolicyVerdict::Deny);
        let engine = PolicyEngine::new().with_rule(a).with_rule(b);

        assert!(engine.evaluate(&DecisionContext::default()).is_pending());
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_all_allow_is_allow() {
        let (a, _) = Fixed::new("A", PolicyVerdict::Allow);
        let (b, _) = Fixed::new("B", PolicyVerdict::Allow);
        let engine = PolicyEngine::new().with_rule(a).with_rule(b);
        let decision = engine.evaluate(&DecisionContext::default());
        assert!(decision.is_allowed());
        assert!(decision.rule_id.is_empty());
    }

    #[test]
    fn test_from_guardrails_wiring() {
        let input = InputGuardrails {
            max_length: 20,
            ..InputGuardrails::default()
        };
        let behavioral = BehavioralGuardrails {
            prohibited_actions: vec!["drop_table".into()],
            max_autonomous_steps: 3,
            ..BehavioralGuardrails::default()
        };
        let engine = PolicyEngine::from_guardrails(&input, &behavioral);
        assert_eq!(engine.len(), 5);

        let long = DecisionContext::for_input("x".repeat(21), 0);
        assert_eq!(engine.evaluate(&long).rule_id, "input_length");

        let prohibited = DecisionContext::for_action("db.drop_table", 0);
        assert_eq!(engine.evaluate(&prohibited).rule_id, "prohibited_actions");

        let past_budget = DecisionContext::for_input("ok", 4);
        assert_eq!(engine.evaluate(&past_budget).rule_id, "max_steps");

        let risky = DecisionContext::for_action("refund", 0).with_risk(RiskLevel::Critical);
        assert!(engine.evaluate(&risky).is_pending());

        let benign = DecisionContext::for_action("lookup", 1).with_risk(RiskLevel::Low);
        assert!(engine.evaluate(&benign).is_allowed());
    }

    #[test]
    fn test_from_guardrails_without_prohibited_actions() {
        let engine = PolicyEngine::from_guardrails(
            &InputGuardrails::default(),
            &BehavioralGuardrails {
                approval_required_for: Vec::new(),
                ..BehavioralGuardrails::default()
            },
        );
        assert_eq!(engine.len(), 3);
    }
}
