//! Prometheus metrics for a bus.
//!
//! # Examples
//!
//! ```rust
//! use eventbus::{BusMetrics, EventBus};
//!
//! let registry = prometheus::Registry::new();
//! let metrics = BusMetrics::new("game_bus").unwrap();
//! metrics.register(&registry).unwrap();
//!
//! let bus = EventBus::builder().with_metrics(metrics.clone()).build();
//! assert_eq!(metrics.posts(), 0);
//! ```

use prometheus::{IntCounter, IntGauge, Registry};

/// Counters describing the activity of one bus.
///
/// Cloning shares the underlying counters.
#[derive(Debug, Clone)]
pub struct BusMetrics {
    posts: IntCounter,
    invocations: IntCounter,
    failures: IntCounter,
    listeners: IntGauge,
}

impl BusMetrics {
    /// Creates metrics whose names start with `prefix`.
    pub fn new(prefix: &str) -> prometheus::Result<Self> {
        Ok(Self {
            posts: IntCounter::new(format!("{prefix}_posts_total"), "Events posted")?,
            invocations: IntCounter::new(
                format!("{prefix}_listener_invocations_total"),
                "Listener bodies run",
            )?,
            failures: IntCounter::new(
                format!("{prefix}_listener_failures_total"),
                "Listener invocations that failed",
            )?,
            listeners: IntGauge::new(
                format!("{prefix}_registered_listeners"),
                "Listeners currently registered",
            )?,
        })
    }

    /// Registers all metrics with `registry`.
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.posts.clone()))?;
        registry.register(Box::new(self.invocations.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.listeners.clone()))?;
        Ok(())
    }

    /// Events posted so far, excluding posts ignored while shut down.
    pub fn posts(&self) -> u64 {
        self.posts.get()
    }

    /// Listener bodies run so far, including the failing ones. Listeners
    /// skipped because the event was canceled are not counted.
    pub fn invocations(&self) -> u64 {
        self.invocations.get()
    }

    /// Listener failures so far.
    pub fn failures(&self) -> u64 {
        self.failures.get()
    }

    /// Listeners currently registered.
    pub fn registered_listeners(&self) -> i64 {
        self.listeners.get()
    }

    pub(crate) fn record_post(&self, invocations: usize) {
        self.posts.inc();
        self.invocations.inc_by(invocations as u64);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.inc();
    }

    pub(crate) fn listeners_added(&self, count: usize) {
        self.listeners.add(count as i64);
    }

    pub(crate) fn listeners_removed(&self, count: usize) {
        self.listeners.sub(count as i64);
    }
}
