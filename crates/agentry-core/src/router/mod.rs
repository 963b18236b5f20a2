//! Language-model router: tier resolution, per-model circuit breaking and
//! fallback along a declared chain.
//!
//! # Modules
//!
//! - [`config`]: `ModelTier`, `RouterConfig`, `BreakerConfig`
//! - [`breaker`]: `CircuitBreaker` (closed / open / half-open)
//! - [`provider`]: `ModelProvider` trait, `ChatRequest`, `ProviderError`
//! - [`llm`]: `LlmRouter`
//! - [`fakes`]: `ScriptedProvider`, `EchoProvider`
//! - [`error`]: `RouterError` / `RouterResult`

pub mod breaker;
pub mod config;
pub mod error;
pub mod fakes;
pub mod llm;
pub mod provider;

pub use breaker::{BreakerState, CircuitBreaker};
pub use config::{BreakerConfig, ModelTier, RouterConfig};
pub use error::{RouterError, RouterResult};
pub use llm::LlmRouter;
pub use provider::{ChatRequest, ModelProvider, ProviderError};
