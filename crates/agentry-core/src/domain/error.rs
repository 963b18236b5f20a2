//! Configuration error taxonomy.

/// Errors produced while validating a pack-derived agent configuration.
///
/// These are operator errors: never retried, surfaced immediately.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid agent config: pack_id must not be empty")]
    EmptyPackId,

    #[error("invalid agent config: duplicate tool id {0}")]
    DuplicateTool(String),

    #[error("invalid agent config: tool {tool_id}: {reason}")]
    InvalidTool { tool_id: String, reason: String },

    #[error("invalid agent config: guardrail {0}")]
    InvalidGuardrail(String),
}

/// Result type for configuration validation.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::DuplicateTool("search".into());
        assert!(err.to_string().contains("duplicate tool id search"));

        let err = ConfigError::InvalidTool {
            tool_id: "fetch".into(),
            reason: "timeout must be positive".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("fetch"));
        assert!(msg.contains("timeout must be positive"));
    }
}
