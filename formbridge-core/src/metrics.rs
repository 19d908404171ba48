//! A minimal metrics sink port, kept ambient regardless of the spec's
//! non-goal on dashboards/alerting: components still emit counters through
//! a trait seam rather than calling a global recorder directly, so a
//! production build can wire in a real backend without touching call sites.

use std::sync::atomic::{AtomicU64, Ordering};

/// Named counters emitted by ingest/orchestrator components.
pub trait MetricsSink: Send + Sync {
    fn incr(&self, name: &'static str);
}

/// Discards every observation. The default when no metrics backend is configured.
#[derive(Debug, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn incr(&self, _name: &'static str) {}
}

/// An in-process counter map, useful for tests asserting on emitted metrics.
#[derive(Debug, Default)]
pub struct CountingMetricsSink {
    ingest_accepted: AtomicU64,
    ingest_rejected: AtomicU64,
    delivery_succeeded: AtomicU64,
    delivery_failed: AtomicU64,
}

impl MetricsSink for CountingMetricsSink {
    fn incr(&self, name: &'static str) {
        let counter = match name {
            "ingest.accepted" => &self.ingest_accepted,
            "ingest.rejected" => &self.ingest_rejected,
            "delivery.succeeded" => &self.delivery_succeeded,
            "delivery.failed" => &self.delivery_failed,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl CountingMetricsSink {
    pub fn ingest_accepted(&self) -> u64 {
        self.ingest_accepted.load(Ordering::Relaxed)
    }

    pub fn delivery_succeeded(&self) -> u64 {
        self.delivery_succeeded.load(Ordering::Relaxed)
    }
}
