//! Engine-wide settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by every task the engine runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model-call retries per task before it fails with `retries_exhausted`.
    pub max_retries: u32,
    /// Base delay before the first retry; doubled on each further retry.
    pub retry_backoff_ms: u64,
    /// Per-tool concurrency for tools that do not declare their own.
    pub default_tool_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 250,
            default_tool_concurrency: 10,
        }
    }
}

impl EngineConfig {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(1 << shift))
    }
}
