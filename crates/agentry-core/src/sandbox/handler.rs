//! Tool handler contract.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::policy::SandboxPolicy;

/// What a handler gets besides its arguments.
///
/// Handlers are trusted to call the `check_*` guards before any network or
/// filesystem access; the sandbox does not intercept handler I/O.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub policy: Arc<SandboxPolicy>,
    pub tenant_id: String,
    pub task_id: Uuid,
}

impl ToolContext {
    pub fn check_egress(&self, host: &str) -> anyhow::Result<()> {
        if !self.policy.is_egress_allowed(host) {
            anyhow::bail!(
                "egress to '{host}' denied for tool '{}' (network: {})",
                self.policy.tool_id,
                self.policy.network
            );
        }
        Ok(())
    }

    pub fn check_read(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if !self.policy.is_path_allowed(path) {
            anyhow::bail!(
                "read of '{}' denied for tool '{}' (filesystem: {})",
                path.display(),
                self.policy.tool_id,
                self.policy.filesystem
            );
        }
        Ok(())
    }

    pub fn check_write(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if !self.policy.is_write_allowed(path) {
            anyhow::bail!(
                "write of '{}' denied for tool '{}' (filesystem: {})",
                path.display(),
                self.policy.tool_id,
                self.policy.filesystem
            );
        }
        Ok(())
    }
}

/// A registered tool implementation.
///
/// Any async closure `Fn(Value, ToolContext) -> Future<Output = anyhow::Result<Value>>`
/// is a handler.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, arguments: Value, ctx: ToolContext) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn invoke(&self, arguments: Value, ctx: ToolContext) -> anyhow::Result<Value> {
        (self)(arguments, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ToolDef;
    use crate::sandbox::{FilesystemMode, NetworkMode};

    fn ctx() -> ToolContext {
        let mut tool = ToolDef::new("fetch", "Fetch");
        tool.sandbox.network = NetworkMode::EgressAllowlist;
        tool.sandbox.egress_allowlist = vec!["api.example.com".into()];
        tool.sandbox.filesystem = FilesystemMode::Scoped;
        tool.sandbox.scoped_paths = vec!["/work".into()];
        ToolContext {
            policy: Arc::new(SandboxPolicy::from_tool_def(&tool).unwrap()),
            tenant_id: "acme".into(),
            task_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_guards_report_denials() {
        let ctx = ctx();
        assert!(ctx.check_egress("api.example.com").is_ok());
        let err = ctx.check_egress("evil.io").unwrap_err();
        assert!(err.to_string().contains("egress to 'evil.io' denied"));
        assert!(ctx.check_read("/work/a.txt").is_ok());
        assert!(ctx.check_write("/work/../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn test_closure_is_a_handler() {
        let handler = |args: Value, ctx: ToolContext| async move {
            Ok::<_, anyhow::Error>(serde_json::json!({"echo": args, "tenant": ctx.tenant_id}))
        };
        let out = handler
            .invoke(serde_json::json!(1), ctx())
            .await
            .unwrap();
        assert_eq!(out["tenant"], "acme");
    }
}
