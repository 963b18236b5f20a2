//! Safety firewall: content checks around every model call.
//!
//! Two independent pipelines, neither consulting the policy engine:
//!
//! - input, before each model call: length, jailbreak scan, PII scan with a
//!   configurable action (warn, redact or block)
//! - output, after each model call: length, PII scan that always blocks
//!
//! # Modules
//!
//! - [`jailbreak`]: `JailbreakDetector` over a regex pattern set
//! - [`pii`]: `PiiScanner`, `PiiMatch`, placeholder redaction
//! - [`pipeline`]: `InputCheck`, `OutputCheck`, `Firewall`, `FirewallVerdict`
//! - [`error`]: `FirewallError` / `FirewallResult`

pub mod error;
pub mod jailbreak;
pub mod pii;
pub mod pipeline;

pub use error::{FirewallError, FirewallResult};
pub use jailbreak::{JailbreakDetector, JailbreakHit};
pub use pii::{PiiAction, PiiMatch, PiiScanner, PiiType};
pub use pipeline::{Firewall, FirewallVerdict, InputCheck, OutputCheck};
