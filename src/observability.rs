//! Observability: tracing subscriber setup and in-process counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over the configured filter when set.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedded use) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_created: AtomicU64,
    jobs_skipped: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    artifacts_registered: AtomicU64,
    audit_events_appended: AtomicU64,
    audit_metadata_dropped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_created(&self) {
        self.jobs_created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_created", "Metric incremented");
    }

    pub fn job_skipped(&self) {
        self.jobs_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_skipped", "Metric incremented");
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_completed", "Metric incremented");
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_failed", "Metric incremented");
    }

    pub fn artifact_registered(&self) {
        self.artifacts_registered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "artifacts_registered", "Metric incremented");
    }

    pub fn audit_event_appended(&self) {
        self.audit_events_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn audit_metadata_dropped(&self, keys: u64) {
        self.audit_metadata_dropped.fetch_add(keys, Ordering::Relaxed);
        tracing::debug!(counter = "audit_metadata_dropped", keys, "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_created: self.jobs_created.load(Ordering::Relaxed),
            jobs_skipped: self.jobs_skipped.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            artifacts_registered: self.artifacts_registered.load(Ordering::Relaxed),
            audit_events_appended: self.audit_events_appended.load(Ordering::Relaxed),
            audit_metadata_dropped: self.audit_metadata_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_created: u64,
    pub jobs_skipped: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub artifacts_registered: u64,
    pub audit_events_appended: u64,
    pub audit_metadata_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.job_created();
        metrics.job_created();
        metrics.job_skipped();
        metrics.audit_metadata_dropped(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_created, 2);
        assert_eq!(snapshot.jobs_skipped, 1);
        assert_eq!(snapshot.audit_metadata_dropped, 3);
        assert_eq!(snapshot.jobs_failed, 0);
    }
}
