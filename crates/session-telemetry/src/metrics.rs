//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes only the counters/gauges the engine and its background tasks emit.

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across the engine and app binary.
#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    active_sessions: IntGauge,
    focus_changes_total: IntCounter,
    evictions_total: IntCounter,
    health_degradations_total: IntCounter,
}

/// Snapshot of the tracked gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Current number of sessions tracked by the engine.
    pub active_sessions: i64,
    /// Total number of times the focus slot has changed occupant.
    pub focus_changes_total: u64,
    /// Total number of sessions evicted from the resident set.
    pub evictions_total: u64,
    /// Total number of times a session's health was marked degraded.
    pub health_degradations_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let active_sessions = IntGauge::with_opts(Opts::new(
            "active_sessions",
            "Number of sessions currently tracked by the engine",
        ))?;
        let focus_changes_total = IntCounter::with_opts(Opts::new(
            "focus_changes_total",
            "Total number of focus-slot occupant changes",
        ))?;
        let evictions_total = IntCounter::with_opts(Opts::new(
            "evictions_total",
            "Total number of sessions evicted from the resident set",
        ))?;
        let health_degradations_total = IntCounter::with_opts(Opts::new(
            "health_degradations_total",
            "Total number of sessions marked degraded",
        ))?;

        registry.register(Box::new(active_sessions.clone()))?;
        registry.register(Box::new(focus_changes_total.clone()))?;
        registry.register(Box::new(evictions_total.clone()))?;
        registry.register(Box::new(health_degradations_total.clone()))?;

        Ok(Self {
            inner: std::sync::Arc::new(MetricsInner {
                registry,
                active_sessions,
                focus_changes_total,
                evictions_total,
                health_degradations_total,
            }),
        })
    }

    /// Set the active session gauge.
    pub fn set_active_sessions(&self, count: i64) {
        self.inner.active_sessions.set(count);
    }

    /// Increment the focus-change counter.
    pub fn inc_focus_change(&self) {
        self.inner.focus_changes_total.inc();
    }

    /// Increment the eviction counter.
    pub fn inc_eviction(&self) {
        self.inner.evictions_total.inc();
    }

    /// Increment the health-degradation counter.
    pub fn inc_health_degradation(&self) {
        self.inner.health_degradations_total.inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Take a point-in-time snapshot of the tracked gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_sessions: self.inner.active_sessions.get(),
            focus_changes_total: self.inner.focus_changes_total.get(),
            evictions_total: self.inner.evictions_total.get(),
            health_degradations_total: self.inner.health_degradations_total.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.set_active_sessions(5);
        metrics.inc_focus_change();
        metrics.inc_eviction();
        metrics.inc_health_degradation();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_sessions, 5);
        assert_eq!(snapshot.focus_changes_total, 1);
        assert_eq!(snapshot.evictions_total, 1);
        assert_eq!(snapshot.health_degradations_total, 1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("active_sessions"));
        assert!(rendered.contains("evictions_total"));
        Ok(())
    }
}
