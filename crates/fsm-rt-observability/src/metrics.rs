//! In-process run metrics.
//!
//! Exporting these to an external telemetry backend is out of scope (spec
//! §1); what a caller gets here is a cheap, lock-free snapshot of one
//! session's counters, suitable for logging a summary line at completion or
//! for an embedding application to forward into its own metrics system.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    events_accepted: AtomicU64,
    validation_failures: AtomicU64,
    llm_retries: AtomicU64,
    bridge_requests: AtomicU64,
    cache_refreshes: AtomicU64,
}

/// A cheaply-cloneable handle onto one session's counters.
#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    inner: Arc<Inner>,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event_accepted(&self) {
        self.inner.events_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self) {
        self.inner.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_llm_retry(&self) {
        self.inner.llm_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bridge_request(&self) {
        self.inner.bridge_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_refresh(&self) {
        self.inner.cache_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunMetricsSnapshot {
        RunMetricsSnapshot {
            events_accepted: self.inner.events_accepted.load(Ordering::Relaxed),
            validation_failures: self.inner.validation_failures.load(Ordering::Relaxed),
            llm_retries: self.inner.llm_retries.load(Ordering::Relaxed),
            bridge_requests: self.inner.bridge_requests.load(Ordering::Relaxed),
            cache_refreshes: self.inner.cache_refreshes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunMetricsSnapshot {
    pub events_accepted: u64,
    pub validation_failures: u64,
    pub llm_retries: u64,
    pub bridge_requests: u64,
    pub cache_refreshes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_across_clones() {
        let metrics = RunMetrics::new();
        let other_handle = metrics.clone();
        metrics.record_event_accepted();
        other_handle.record_event_accepted();
        metrics.record_llm_retry();
        let snap = metrics.snapshot();
        assert_eq!(snap.events_accepted, 2);
        assert_eq!(snap.llm_retries, 1);
    }
}
