//! Error types for the firewall module.

/// Errors building a firewall. Checking text never fails.
#[derive(Debug, thiserror::Error)]
pub enum FirewallError {
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type FirewallResult<T> = std::result::Result<T, FirewallError>;

pub(crate) fn compile(pattern: &str) -> FirewallResult<regex::Regex> {
    regex::Regex::new(pattern).map_err(|source| FirewallError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}
