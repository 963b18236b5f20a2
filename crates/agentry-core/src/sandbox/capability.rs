//! Network and filesystem capability modes.

use serde::{Deserialize, Serialize};

/// Outbound network access granted to a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    #[default]
    None,
    /// Only hosts listed in the egress allowlist.
    EgressAllowlist,
    Full,
}

/// Filesystem access granted to a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilesystemMode {
    #[default]
    None,
    ReadOnly,
    ReadWrite,
    /// Read-write beneath the declared path prefixes only.
    Scoped,
}

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkMode::None => write!(f, "none"),
            NetworkMode::EgressAllowlist => write!(f, "egress_allowlist"),
            NetworkMode::Full => write!(f, "full"),
        }
    }
}

impl std::fmt::Display for FilesystemMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilesystemMode::None => write!(f, "none"),
            FilesystemMode::ReadOnly => write!(f, "read_only"),
            FilesystemMode::ReadWrite => write!(f, "read_write"),
            FilesystemMode::Scoped => write!(f, "scoped"),
        }
    }
}
