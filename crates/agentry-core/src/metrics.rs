//! Global atomic counters for Agentry observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a task finishes).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters: no allocations, no locking.
pub struct Metrics {
    tasks_started: AtomicU64,
    tool_invocations: AtomicU64,
    breaker_trips: AtomicU64,
    firewall_blocks: AtomicU64,
    policy_denials: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            tasks_started: AtomicU64::new(0),
            tool_invocations: AtomicU64::new(0),
            breaker_trips: AtomicU64::new(0),
            firewall_blocks: AtomicU64::new(0),
            policy_denials: AtomicU64::new(0),
        }
    }

    pub fn inc_tasks_started(&self) {
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tasks_started", "counter incremented");
    }

    pub fn inc_tool_invocations(&self) {
        self.tool_invocations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tool_invocations", "counter incremented");
    }

    pub fn inc_breaker_trips(&self) {
        self.breaker_trips.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "breaker_trips", "counter incremented");
    }

    pub fn inc_firewall_blocks(&self) {
        self.firewall_blocks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "firewall_blocks", "counter incremented");
    }

    /// Counts both DENY and PENDING_APPROVAL outcomes.
    pub fn inc_policy_denials(&self) {
        self.policy_denials.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "policy_denials", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            tasks_started = self.tasks_started(),
            tool_invocations = self.tool_invocations(),
            breaker_trips = self.breaker_trips(),
            firewall_blocks = self.firewall_blocks(),
            policy_denials = self.policy_denials(),
        );
    }

    pub fn tasks_started(&self) -> u64 {
        self.tasks_started.load(Ordering::Relaxed)
    }

    pub fn tool_invocations(&self) -> u64 {
        self.tool_invocations.load(Ordering::Relaxed)
    }

    pub fn breaker_trips(&self) -> u64 {
        self.breaker_trips.load(Ordering::Relaxed)
    }

    pub fn firewall_blocks(&self) -> u64 {
        self.firewall_blocks.load(Ordering::Relaxed)
    }

    pub fn policy_denials(&self) -> u64 {
        self.policy_denials.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_tasks_started();
        m.inc_tool_invocations();
        m.inc_tool_invocations();
        m.inc_breaker_trips();
        m.inc_firewall_blocks();
        m.inc_policy_denials();
        m.inc_policy_denials();
        m.inc_policy_denials();
        assert_eq!(m.tasks_started(), 1);
        assert_eq!(m.tool_invocations(), 2);
        assert_eq!(m.breaker_trips(), 1);
        assert_eq!(m.firewall_blocks(), 1);
        assert_eq!(m.policy_denials(), 3);
    }
}
