//! Pattern-based jailbreak detection.
//!
//! Patterns target specific override techniques rather than general
//! conversation, so ordinary negations ("please don't ignore my question")
//! pass.

use super::error::{compile, FirewallResult};

/// Default patterns: instruction override, role-play bypass, system prompt
/// extraction and chat-template token injection.
pub const DEFAULT_PATTERNS: &[&str] = &[
    r"(?i)ignore\s+(?:all\s+)?(?:previous|prior|above)\s+instructions",
    r"(?i)disregard\s+(?:all\s+)?(?:previous|prior|your)\s+(?:instructions|rules|guidelines)",
    r"(?i)forget\s+(?:all\s+)?(?:your|previous)\s+(?:instructions|rules|training)",
    r"(?i)you\s+are\s+(?:now\s+)?(?:DAN|STAN|DUDE|Evil)\b",
    r"(?i)(?:activate|enable|enter)\s+(?:developer|admin|god|sudo)\s+mode",
    r"(?i)pretend\s+(?:that\s+)?you\s+(?:have\s+no|are\s+not\s+bound\s+by)\s+(?:restrictions|rules|guidelines)",
    r"(?i)\bjailbreak(?:ed)?\b",
    r"(?i)(?:print|show|display|reveal|output)\s+(?:your\s+)?(?:system\s+)?prompt\s+verbatim",
    r"(?i)reveal\s+(?:your\s+)?(?:system|initial|hidden)\s+(?:prompt|instructions)",
    r"(?i)(?:what|show)\s+(?:is|are)\s+your\s+(?:system|initial)\s+(?:prompt|instructions)",
    r"(?i)\[SYSTEM\]|\[INST\]|<<SYS>>",
];

/// Longest excerpt of the offending text quoted in a block reason.
const EXCERPT_CHARS: usize = 50;

/// A pattern hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JailbreakHit {
    pub pattern: String,
    pub excerpt: String,
}

impl JailbreakHit {
    pub fn reason(&self) -> String {
        format!("jailbreak pattern detected: {}", self.excerpt)
    }
}

/// Compiled jailbreak pattern set.
#[derive(Debug, Clone)]
pub struct JailbreakDetector {
    patterns: Vec<regex::Regex>,
}

impl JailbreakDetector {
    /// The default set plus `extra` patterns.
    pub fn new<S: AsRef<str>>(extra: &[S]) -> FirewallResult<Self> {
        let patterns = DEFAULT_PATTERNS
            .iter()
            .copied()
            .chain(extra.iter().map(AsRef::as_ref))
            .map(compile)
            .collect::<FirewallResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn with_defaults() -> FirewallResult<Self> {
        Self::new::<&str>(&[])
    }

    /// First matching pattern, in declaration order.
    pub fn scan(&self, text: &str) -> Option<JailbreakHit> {
        self.patterns.iter().find_map(|re| {
            re.find(text).map(|m| JailbreakHit {
                pattern: re.as_str().to_string(),
                excerpt: m.as_str().chars().take(EXCERPT_CHARS).collect(),
            })
        })
    }
}
