//! Per-model circuit breaker.
//!
//! ```text
//!   CLOSED --(threshold failures in window)--> OPEN --(cooldown)--> HALF_OPEN
//!     ^                                          ^                     |
//!     |                                          +----(probe fails)----+
//!     +-----------------(any success)------------------------------------+
//! ```
//!
//! Half-open admits exactly one probe at a time. A probe that never reports
//! back is abandoned after another cooldown so the breaker cannot wedge.
//!
//! Time comes from `tokio::time::Instant` so tests can drive it with a
//! paused clock; every time-dependent method has an `_at` variant taking an
//! explicit instant.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::config::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    probe_started: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure: None,
            probe_started: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Whether the breaker would reject a call right now without mutating it.
    pub fn is_open_at(&self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed => false,
            BreakerState::Open => !self.cooled_down(now),
            BreakerState::HalfOpen => self
                .probe_started
                .is_some_and(|started| now.duration_since(started) < self.config.cooldown()),
        }
    }

    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Ask permission for one call. In half-open this claims the single probe.
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                if self.cooled_down(now) {
                    self.state = BreakerState::HalfOpen;
                    self.probe_started = Some(now);
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => match self.probe_started {
                Some(started) if now.duration_since(started) < self.config.cooldown() => false,
                _ => {
                    self.probe_started = Some(now);
                    true
                }
            },
        }
    }

    /// Any success closes the breaker and clears the failure count.
    pub fn record_success(&mut self) {
        self.state = BreakerState::Closed;
        self.failure_count = 0;
        self.last_failure = None;
        self.probe_started = None;
    }

    pub fn record_failure(&mut self) -> bool {
        self.record_failure_at(Instant::now())
    }

    /// Record a failure. Returns `true` when this failure opened the breaker.
    pub fn record_failure_at(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_failure {
            if now.duration_since(last) > self.config.failure_window() {
                self.failure_count = 0;
            }
        }
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(now);

        match self.state {
            BreakerState::HalfOpen => {
                self.state = BreakerState::Open;
                self.probe_started = None;
                true
            }
            BreakerState::Closed if self.failure_count >= self.config.failure_threshold => {
                self.state = BreakerState::Open;
                true
            }
            _ => false,
        }
    }

    fn cooled_down(&self, now: Instant) -> bool {
        self.last_failure
            .map_or(true, |last| now.duration_since(last) >= self.config.cooldown())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            failure_window_secs: 60,
            cooldown_secs: 120,
        })
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_starts_closed() {
        let mut cb = breaker();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.try_acquire_at(Instant::now()));
    }

    #[test]
    fn test_opens_at_threshold() {
        let t0 = Instant::now();
        let mut cb = breaker();
        assert!(!cb.record_failure_at(t0));
        assert!(!cb.record_failure_at(t0 + secs(1)));
        assert!(cb.record_failure_at(t0 + secs(2)));
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.try_acquire_at(t0 + secs(3)));
        assert!(cb.is_open_at(t0 + secs(3)));
    }

    #[test]
    fn test_half_open_admits_exactly_one_probe() {
        let t0 = Instant::now();
        let mut cb = breaker();
        for i in 0..3 {
            cb.record_failure_at(t0 + secs(i));
        }
        let after_cooldown = t0 + secs(2) + secs(120);
        assert!(cb.try_acquire_at(after_cooldown));
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(!cb.try_acquire_at(after_cooldown));
        assert!(!cb.try_acquire_at(after_cooldown + secs(1)));
    }

    #[test]
    fn test_probe_success_closes() {
        let t0 = Instant::now();
        let mut cb = breaker();
        for _ in 0..3 {
            cb.record_failure_at(t0);
        }
        assert!(cb.try_acquire_at(t0 + secs(120)));
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert!(cb.try_acquire_at(t0 + secs(120)));
    }

    #[test]
    fn test_probe_failure_reopens() {
        let t0 = Instant::now();
        let mut cb = breaker();
        for _ in 0..3 {
            cb.record_failure_at(t0);
        }
        let probe_at = t0 + secs(120);
        assert!(cb.try_acquire_at(probe_at));
        assert!(cb.record_failure_at(probe_at + secs(1)));
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.try_acquire_at(probe_at + secs(2)));
    }

    #[test]
    fn test_abandoned_probe_is_replaced_after_cooldown() {
        let t0 = Instant::now();
        let mut cb = breaker();
        for _ in 0..3 {
            cb.record_failure_at(t0);
        }
        let probe_at = t0 + secs(120);
        assert!(cb.try_acquire_at(probe_at));
        assert!(cb.try_acquire_at(probe_at + secs(120)));
    }

    #[test]
    fn test_success_resets_from_any_state() {
        let t0 = Instant::now();
        let mut cb = breaker();
        cb.record_failure_at(t0);
        cb.record_failure_at(t0);
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        cb.record_failure_at(t0);
        cb.record_failure_at(t0);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_failures_outside_window_do_not_accumulate() {
        let t0 = Instant::now();
        let mut cb = breaker();
        cb.record_failure_at(t0);
        cb.record_failure_at(t0 + secs(30));
        assert!(!cb.record_failure_at(t0 + secs(30) + secs(61)));
        assert_eq!(cb.failure_count(), 1);
        assert_eq!(cb.state(), BreakerState::Closed);
    }
}
