//! Structured PII detection and placeholder redaction.

use serde::{Deserialize, Serialize};

use super::error::{compile, FirewallResult};

/// What the input pipeline does with detected PII.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiAction {
    /// Pass the text through with matches attached.
    #[default]
    Warn,
    /// Replace each match with a type placeholder.
    Redact,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    Email,
    Phone,
    Ssn,
    CreditCard,
}

impl PiiType {
    pub fn placeholder(self) -> &'static str {
        match self {
            PiiType::Email => "[EMAIL]",
            PiiType::Phone => "[PHONE]",
            PiiType::Ssn => "[SSN]",
            PiiType::CreditCard => "[CREDIT_CARD]",
        }
    }
}

/// One detected span. Offsets are byte offsets into the scanned text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiMatch {
    pub pii_type: PiiType,
    pub value: String,
    pub start: usize,
    pub end: usize,
}

impl PiiMatch {
    fn overlaps(&self, other: &PiiMatch) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// Conservative patterns; card candidates are additionally Luhn-checked.
const PATTERNS: &[(PiiType, &str)] = &[
    (PiiType::Email, r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"),
    (PiiType::Ssn, r"\b\d{3}-\d{2}-\d{4}\b"),
    (PiiType::CreditCard, r"\b(?:\d[ -]*?){13,16}\b"),
    (
        PiiType::Phone,
        r"(?:\+?1[-.\s]?)?(?:\(?\d{3}\)?[-.\s]?)?\d{3}[-.\s]?\d{4}\b",
    ),
];

#[derive(Debug, Clone)]
pub struct PiiScanner {
    patterns: Vec<(PiiType, regex::Regex)>,
}

impl PiiScanner {
    pub fn new() -> FirewallResult<Self> {
        let patterns = PATTERNS
            .iter()
            .map(|(ty, p)| compile(p).map(|re| (*ty, re)))
            .collect::<FirewallResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// All PII spans in `text`, ordered by position and non-overlapping.
    ///
    /// Where two candidates overlap, the earlier-starting one wins; on equal
    /// starts the longer one wins.
    pub fn scan(&self, text: &str) -> Vec<PiiMatch> {
        let mut candidates: Vec<PiiMatch> = self
            .patterns
            .iter()
            .flat_map(|(ty, re)| {
                re.find_iter(text).map(move |m| PiiMatch {
                    pii_type: *ty,
                    value: m.as_str().to_string(),
                    start: m.start(),
                    end: m.end(),
                })
            })
            .filter(|m| m.pii_type != PiiType::CreditCard || luhn_valid(&m.value))
            .collect();

        candidates.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

        let mut kept: Vec<PiiMatch> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if kept.last().is_some_and(|last| last.overlaps(&candidate)) {
                continue;
            }
            kept.push(candidate);
        }
        kept
    }

    /// `text` with every match replaced by its type placeholder.
    pub fn redact(&self, text: &str) -> (String, Vec<PiiMatch>) {
        let matches = self.scan(text);
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for m in &matches {
            out.push_str(&text[cursor..m.start]);
            out.push_str(m.pii_type.placeholder());
            cursor = m.end;
        }
        out.push_str(&text[cursor..]);
        (out, matches)
    }
}

/// Luhn checksum over the digits of `candidate`; 13 to 16 digits required.
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=16).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> PiiScanner {
        PiiScanner::new().unwrap()
    }

    fn types(text: &str) -> Vec<PiiType> {
        scanner().scan(text).into_iter().map(|m| m.pii_type).collect()
    }

    #[test]
    fn test_detects_each_type() {
        assert_eq!(types("mail me at jane.doe@example.com"), vec![PiiType::Email]);
        assert_eq!(types("SSN: 123-45-6789"), vec![PiiType::Ssn]);
        assert_eq!(types("call 555-123-4567 today"), vec![PiiType::Phone]);
        assert_eq!(
            types("card 4111 1111 1111 1111 on file"),
            vec![PiiType::CreditCard]
        );
    }

    #[test]
    fn test_card_requires_luhn() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("4111-1111-1111-1111"));
        assert!(!luhn_valid("4111111111111112"));
        assert!(!luhn_valid("411111"));
        assert!(!types("order 1234 5678 9012 3456").contains(&PiiType::CreditCard));
    }

    #[test]
    fn test_clean_text_has_no_matches() {
        assert!(scanner().scan("The meeting is at 3pm in room 12.").is_empty());
    }

    #[test]
    fn test_redact_replaces_in_place() {
        let (text, matches) =
            scanner().redact("Email jane@example.com or call 555-123-4567, SSN 123-45-6789.");
        assert_eq!(text, "Email [EMAIL] or call [PHONE], SSN [SSN].");
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn test_overlapping_candidates_are_merged() {
        let (text, matches) = scanner().redact("card: 4111 1111 1111 1111.");
        assert_eq!(text, "card: [CREDIT_CARD].");
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_offsets_are_ordered_and_disjoint() {
        let matches = scanner().scan("a@b.io 123-45-6789 c@d.io");
        for pair in matches.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        assert_eq!(matches.len(), 3);
    }
}
