//! Resolved per-invocation sandbox policy.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ToolDef;

use super::capability::{FilesystemMode, NetworkMode};
use super::error::{SandboxError, SandboxResult};

/// Constraints a single tool invocation must honor.
///
/// Rebuilt from the tool definition on every call, since tenants may carry
/// different definitions for the same tool id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxPolicy {
    pub tool_id: String,
    pub timeout: Duration,
    pub memory_bytes: Option<u64>,
    pub cpu: Option<f64>,
    pub network: NetworkMode,
    pub egress_allowlist: Vec<String>,
    pub filesystem: FilesystemMode,
    /// Normalized scope prefixes.
    pub scoped_paths: Vec<PathBuf>,
    pub max_concurrent: Option<usize>,
}

impl SandboxPolicy {
    pub fn from_tool_def(tool: &ToolDef) -> SandboxResult<Self> {
        let spec = &tool.sandbox;
        let invalid = |reason: String| SandboxError::InvalidPolicy {
            tool_id: tool.id.clone(),
            reason,
        };

        let memory_bytes = spec
            .memory
            .as_deref()
            .map(parse_memory)
            .transpose()
            .map_err(invalid)?;

        if let Some(cpu) = spec.cpu {
            if !(cpu.is_finite() && cpu > 0.0) {
                return Err(invalid(format!("cpu ceiling must be positive, got {cpu}")));
            }
        }

        let scoped_paths = spec
            .scoped_paths
            .iter()
            .filter(|p| !p.trim().is_empty())
            .filter_map(|p| normalize(Path::new(p)))
            .collect();

        Ok(Self {
            tool_id: tool.id.clone(),
            timeout: Duration::from_secs(spec.timeout_secs),
            memory_bytes,
            cpu: spec.cpu,
            network: spec.network,
            egress_allowlist: spec.egress_allowlist.clone(),
            filesystem: spec.filesystem,
            scoped_paths,
            max_concurrent: spec.max_concurrent,
        })
    }

    /// Whether the tool may open a connection to `host`.
    ///
    /// An allowlist containing a wildcard entry denies every host regardless
    /// of the network mode.
    pub fn is_egress_allowed(&self, host: &str) -> bool {
        if self.egress_allowlist.iter().any(|h| h.contains('*')) {
            return false;
        }
        let host = host.trim().trim_end_matches('.');
        if host.is_empty() {
            return false;
        }
        match self.network {
            NetworkMode::None => false,
            NetworkMode::Full => true,
            NetworkMode::EgressAllowlist => self
                .egress_allowlist
                .iter()
                .any(|allowed| allowed.trim().trim_end_matches('.').eq_ignore_ascii_case(host)),
        }
    }

    /// Whether the tool may read `path`.
    ///
    /// In scoped mode the path is normalized lexically (`.` and `..`
    /// resolved) and must sit at or beneath a scope prefix, compared
    /// component-wise so `/data-evil` is not under `/data`.
    pub fn is_path_allowed(&self, path: impl AsRef<Path>) -> bool {
        match self.filesystem {
            FilesystemMode::None => false,
            FilesystemMode::ReadOnly | FilesystemMode::ReadWrite => true,
            FilesystemMode::Scoped => self.in_scope(path.as_ref()),
        }
    }

    /// Whether the tool may write `path`.
    pub fn is_write_allowed(&self, path: impl AsRef<Path>) -> bool {
        match self.filesystem {
            FilesystemMode::None | FilesystemMode::ReadOnly => false,
            FilesystemMode::ReadWrite => true,
            FilesystemMode::Scoped => self.in_scope(path.as_ref()),
        }
    }

    fn in_scope(&self, path: &Path) -> bool {
        let Some(normalized) = normalize(path) else {
            return false;
        };
        self.scoped_paths
            .iter()
            .any(|scope| normalized.starts_with(scope))
    }
}

/// Lexically resolve `.` and `..`.
///
/// `..` at the root stays at the root; a relative path that climbs above its
/// starting point cannot be placed and yields `None`.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                out.push(component.as_os_str());
                depth = 0;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    out.pop();
                    depth -= 1;
                } else if !path.has_root() {
                    return None;
                }
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
        }
    }
    if out.as_os_str().is_empty() {
        return None;
    }
    Some(out)
}

/// Parse a memory ceiling such as `"256Mi"`, `"1GB"` or `"1048576"` into
/// bytes. Binary suffixes (`Ki`, `Mi`, `Gi`, `Ti`) are powers of 1024,
/// decimal ones (`K`/`KB`, `M`/`MB`, `G`/`GB`, `T`/`TB`) powers of 1000.
pub fn parse_memory(raw: &str) -> Result<u64, String> {
    let trimmed = raw.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid memory size '{raw}'"))?;

    let multiplier: u64 = match suffix.trim() {
        "" | "B" | "b" => 1,
        "Ki" => 1 << 10,
        "Mi" => 1 << 20,
        "Gi" => 1 << 30,
        "Ti" => 1 << 40,
        s => match s.to_ascii_uppercase().as_str() {
            "K" | "KB" => 1_000,
            "M" | "MB" => 1_000_000,
            "G" | "GB" => 1_000_000_000,
            "T" | "TB" => 1_000_000_000_000,
            _ => return Err(format!("unknown memory unit '{s}' in '{raw}'")),
        },
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("memory size '{raw}' overflows"))
}
