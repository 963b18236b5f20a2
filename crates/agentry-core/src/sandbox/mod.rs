//! Sandbox: capability-scoped tool execution with mandatory audit.
//!
//! Each invocation resolves a fresh [`SandboxPolicy`] from the tool
//! definition, passes the denylist and handler checks, then runs the handler
//! under the policy timeout and a per-tool concurrency limiter. Handlers
//! consult the policy's egress and path predicates (via [`ToolContext`])
//! before touching the network or filesystem.
//!
//! # Modules
//!
//! - [`capability`]: `NetworkMode`, `FilesystemMode`
//! - [`policy`]: `SandboxPolicy`, egress/path predicates, memory parsing
//! - [`handler`]: `ToolHandler` trait, `ToolContext`
//! - [`audit`]: audit entry construction
//! - [`executor`]: `ToolSandbox`, `ToolInvocation`, `ToolExecutionResult`
//! - [`error`]: `SandboxError` / `SandboxResult`

pub mod audit;
pub mod capability;
pub mod error;
pub mod executor;
pub mod handler;
pub mod policy;

pub use capability::{FilesystemMode, NetworkMode};
pub use error::{SandboxError, SandboxResult};
pub use executor::{ToolExecutionResult, ToolInvocation, ToolSandbox};
pub use handler::{ToolContext, ToolHandler};
pub use policy::{parse_memory, SandboxPolicy};
