//! System prompt assembly from the soul, role and guardrail layers.

use crate::domain::AgentConfig;

/// One `Label: value` line per non-empty field; list fields are joined
/// with `"; "`.
pub fn system_prompt(agent: &AgentConfig) -> String {
    let soul = &agent.soul;
    let role = &agent.role;
    let behavioral = &agent.guardrails.behavioral;

    let lines = [
        ("Tone", soul.tone.clone()),
        ("Principles", soul.principles.join("; ")),
        ("Role", role.title.clone()),
        ("Domain", role.domain.clone()),
        ("Goal", role.goal.clone()),
        ("Backstory", role.backstory.clone()),
        ("Limitations", role.limitations.join("; ")),
        ("Prohibited actions", behavioral.prohibited_actions.join("; ")),
        ("Required disclaimers", behavioral.required_disclaimers.join("; ")),
    ];

    lines
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(label, value)| format!("{label}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}
