//! The router proper.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::ModelResponse;
use crate::metrics::METRICS;
use crate::obs;

use super::breaker::{BreakerState, CircuitBreaker};
use super::config::{ModelTier, RouterConfig};
use super::error::{RouterError, RouterResult};
use super::provider::{ChatRequest, ModelProvider, ProviderError};

/// Routes chat requests by tier, with per-model breakers and fallback.
///
/// One router is shared by every task; breaker state is keyed by concrete
/// model id and guarded by a mutex that is never held across an await.
pub struct LlmRouter {
    config: RouterConfig,
    provider: Arc<dyn ModelProvider>,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
}

impl std::fmt::Debug for LlmRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmRouter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LlmRouter {
    /// Fails if the default tier or any fallback tier is unmapped.
    pub fn new(config: RouterConfig, provider: Arc<dyn ModelProvider>) -> RouterResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            provider,
            breakers: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Concrete model for `tier`, or for the default tier when `None`.
    pub fn resolve_model(&self, tier: Option<ModelTier>) -> RouterResult<&str> {
        self.config.resolve(tier.unwrap_or(self.config.default_tier))
    }

    /// Current breaker state for `model`; models never called are closed.
    pub fn breaker_state(&self, model: &str) -> BreakerState {
        self.lock()
            .get(model)
            .map_or(BreakerState::Closed, CircuitBreaker::state)
    }

    /// Send `request` to the model for `tier`, walking the fallback chain
    /// when that model's breaker is open or its call fails.
    ///
    /// Outcomes are recorded against the model actually invoked.
    pub async fn chat(
        &self,
        tier: Option<ModelTier>,
        request: &ChatRequest,
    ) -> RouterResult<ModelResponse> {
        let requested = tier.unwrap_or(self.config.default_tier);
        let primary = self.config.resolve(requested)?;

        let candidates = std::iter::once(Ok(primary)).chain(
            self.config
                .fallbacks_after(requested)
                .iter()
                .map(|t| self.config.resolve(*t)),
        );

        let mut tried = HashSet::new();
        let mut last_error = String::from("no candidate model");

        for model in candidates {
            let model = model?;
            if !tried.insert(model) {
                continue;
            }

            if !self.acquire(model) {
                last_error = format!("circuit open for model '{model}'");
                obs::emit_router_fallback(model, &last_error);
                continue;
            }

            match self.invoke(model, request).await {
                Ok(mut response) => {
                    self.with_breaker(model, CircuitBreaker::record_success);
                    if response.model.is_empty() {
                        response.model = model.to_string();
                    }
                    return Ok(response);
                }
                Err(err) => {
                    self.record_failure(model);
                    obs::emit_router_fallback(model, &err);
                    last_error = err.to_string();
                }
            }
        }

        Err(RouterError::AllProvidersUnavailable {
            tier: requested,
            last_error,
        })
    }

    async fn invoke(&self, model: &str, request: &ChatRequest) -> Result<ModelResponse, ProviderError> {
        let timeout = self.config.provider_timeout();
        match tokio::time::timeout(timeout, self.provider.call(model, request)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ProviderError::Timeout(timeout)),
        }
    }

    fn acquire(&self, model: &str) -> bool {
        self.with_breaker(model, CircuitBreaker::try_acquire)
    }

    fn record_failure(&self, model: &str) {
        let (opened, failures) =
            self.with_breaker(model, |b| (b.record_failure(), b.failure_count()));
        if opened {
            METRICS.inc_breaker_trips();
            obs::emit_breaker_opened(model, failures);
        }
    }

    fn with_breaker<R>(&self, model: &str, f: impl FnOnce(&mut CircuitBreaker) -> R) -> R {
        let mut breakers = self.lock();
        let breaker = breakers
            .entry(model.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.config.breaker.clone()));
        f(breaker)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CircuitBreaker>> {
        self.breakers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::router::config::BreakerConfig;
    use crate::router::fakes::ScriptedProvider;

    fn config() -> RouterConfig {
        RouterConfig {
            breaker: BreakerConfig {
                failure_threshold: 2,
                failure_window_secs: 60,
                cooldown_secs: 120,
            },
            ..RouterConfig::default()
        }
        .with_tier(ModelTier::MostCapable, "big")
        .with_tier(ModelTier::Balanced, "mid")
        .with_tier(ModelTier::Fast, "small")
        .with_fallback_chain(vec![
            ModelTier::MostCapable,
            ModelTier::Balanced,
            ModelTier::Fast,
        ])
    }

    fn router(provider: &Arc<ScriptedProvider>) -> LlmRouter {
        LlmRouter::new(config(), provider.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_requested_tier_answers() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("mid", "hello");
        let response = router(&provider)
            .chat(None, &ChatRequest::default())
            .await
            .unwrap();
        assert_eq!(response.content, "hello");
        assert_eq!(response.model, "mid");
        assert_eq!(provider.calls(), vec!["mid".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_falls_back_and_records_against_invoked_model() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_failure("big", "503");
        provider.push_text("mid", "from mid");
        let router = router(&provider);

        let response = router
            .chat(Some(ModelTier::MostCapable), &ChatRequest::default())
            .await
            .unwrap();
        assert_eq!(response.model, "mid");
        assert_eq!(provider.calls(), vec!["big".to_string(), "mid".to_string()]);

        let breakers = router.lock();
        assert_eq!(breakers["big"].failure_count(), 1);
        assert_eq!(breakers["mid"].failure_count(), 0);
    }

    #[tokio::test]
    async fn test_open_breaker_is_skipped_without_a_call() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_failure("big", "down");
        provider.push_failure("big", "down");
        provider.push_text("mid", "one");
        provider.push_text("mid", "two");
        let router = router(&provider);

        router
            .chat(Some(ModelTier::MostCapable), &ChatRequest::default())
            .await
            .unwrap();
        router
            .chat(Some(ModelTier::MostCapable), &ChatRequest::default())
            .await
            .unwrap();
        assert_eq!(router.breaker_state("big"), BreakerState::Open);

        provider.push_text("mid", "three");
        let response = router
            .chat(Some(ModelTier::MostCapable), &ChatRequest::default())
            .await
            .unwrap();
        assert_eq!(response.content, "three");
        let big_calls = provider.calls().iter().filter(|m| *m == "big").count();
        assert_eq!(big_calls, 2);
    }

    #[tokio::test]
    async fn test_all_unavailable() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_failure("mid", "boom");
        provider.push_failure("small", "bust");
        let err = router(&provider)
            .chat(Some(ModelTier::Balanced), &ChatRequest::default())
            .await
            .unwrap_err();
        match err {
            RouterError::AllProvidersUnavailable { tier, last_error } => {
                assert_eq!(tier, ModelTier::Balanced);
                assert!(last_error.contains("bust"));
            }
            other => panic!("expected AllProvidersUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unmapped_requested_tier() {
        let provider = Arc::new(ScriptedProvider::new());
        let cfg = RouterConfig::default().with_tier(ModelTier::Balanced, "mid");
        let router = LlmRouter::new(cfg, provider).unwrap();
        let err = router
            .chat(Some(ModelTier::Fast), &ChatRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err, RouterError::UnmappedTier(ModelTier::Fast));
        assert!(err.is_configuration());
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_timeout_counts_as_failure() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_delayed("mid", Duration::from_secs(600), "late");
        provider.push_text("small", "fast answer");
        let router = router(&provider);

        let response = router
            .chat(Some(ModelTier::Balanced), &ChatRequest::default())
            .await
            .unwrap();
        assert_eq!(response.content, "fast answer");
        assert_eq!(router.lock()["mid"].failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_recovers_after_cooldown() {
        let provider = Arc::new(ScriptedProvider::new());
        let cfg = RouterConfig {
            breaker: BreakerConfig {
                failure_threshold: 1,
                failure_window_secs: 60,
                cooldown_secs: 30,
            },
            ..RouterConfig::default()
        }
        .with_tier(ModelTier::Balanced, "mid");
        let router = LlmRouter::new(cfg, provider.clone()).unwrap();

        provider.push_failure("mid", "down");
        assert!(router.chat(None, &ChatRequest::default()).await.is_err());
        assert_eq!(router.breaker_state("mid"), BreakerState::Open);

        provider.push_text("mid", "back");
        assert!(router.chat(None, &ChatRequest::default()).await.is_err());

        tokio::time::advance(Duration::from_secs(31)).await;
        let response = router.chat(None, &ChatRequest::default()).await.unwrap();
        assert_eq!(response.content, "back");
        assert_eq!(router.breaker_state("mid"), BreakerState::Closed);
    }
}
