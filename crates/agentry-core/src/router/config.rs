//! Router configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{RouterError, RouterResult};

/// Abstract capability class resolved to a concrete model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    MostCapable,
    Balanced,
    Fast,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelTier::MostCapable => write!(f, "most_capable"),
            ModelTier::Balanced => write!(f, "balanced"),
            ModelTier::Fast => write!(f, "fast"),
        }
    }
}

/// Per-model circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failures within the window that open the breaker.
    pub failure_threshold: u32,
    /// Failures older than this no longer count toward the threshold.
    pub failure_window_secs: u64,
    /// Time an open breaker waits before allowing a probe.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_secs: 60,
            cooldown_secs: 120,
        }
    }
}

impl BreakerConfig {
    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Tier to concrete model identifier.
    pub tiers: BTreeMap<ModelTier, String>,
    pub default_tier: ModelTier,
    /// Ordered tiers; a call falls back to the tiers after the requested one.
    pub fallback_chain: Vec<ModelTier>,
    pub provider_timeout_secs: u64,
    pub breaker: BreakerConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            tiers: BTreeMap::new(),
            default_tier: ModelTier::Balanced,
            fallback_chain: Vec::new(),
            provider_timeout_secs: 60,
            breaker: BreakerConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Map every tier to the same model (handy for single-model setups).
    pub fn single_model(model: impl Into<String>) -> Self {
        let model = model.into();
        let tiers = [ModelTier::MostCapable, ModelTier::Balanced, ModelTier::Fast]
            .into_iter()
            .map(|t| (t, model.clone()))
            .collect();
        Self {
            tiers,
            ..Self::default()
        }
    }

    pub fn with_tier(mut self, tier: ModelTier, model: impl Into<String>) -> Self {
        self.tiers.insert(tier, model.into());
        self
    }

    pub fn with_fallback_chain(mut self, chain: Vec<ModelTier>) -> Self {
        self.fallback_chain = chain;
        self
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn resolve(&self, tier: ModelTier) -> RouterResult<&str> {
        self.tiers
            .get(&tier)
            .map(String::as_str)
            .ok_or(RouterError::UnmappedTier(tier))
    }

    /// Tiers after `tier` in the fallback chain; empty if `tier` is absent.
    pub fn fallbacks_after(&self, tier: ModelTier) -> &[ModelTier] {
        match self.fallback_chain.iter().position(|t| *t == tier) {
            Some(idx) => &self.fallback_chain[idx + 1..],
            None => &[],
        }
    }

    /// Every tier the router can reach by default must be mapped.
    pub fn validate(&self) -> RouterResult<()> {
        self.resolve(self.default_tier)?;
        for tier in &self.fallback_chain {
            self.resolve(*tier)?;
        }
        Ok(())
    }
}
