//! Policy: declarative, ordered rule evaluation for every agent turn.
//!
//! Evaluation walks the rule list in order and stops at the first verdict
//! that is not `Allow`. An empty list, or a list where every rule allows,
//! yields `Allow`.
//!
//! # Modules
//!
//! - [`context`]: `DecisionContext`, the per-turn fact set
//! - [`decision`]: `PolicyVerdict` + `PolicyDecision`
//! - [`rules`]: `Rule` trait and the built-in `PolicyRule` variants
//! - [`engine`]: `PolicyEngine` (short-circuit evaluation, guardrail wiring)

pub mod context;
pub mod decision;
pub mod engine;
pub mod rules;

pub use context::DecisionContext;
pub use decision::{PolicyDecision, PolicyVerdict};
pub use engine::PolicyEngine;
pub use rules::{PolicyRule, Rule};
