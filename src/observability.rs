//! Collector metrics

use std::sync::atomic::{AtomicU64, Ordering};

use crate::gc::PassReport;

/// Counters for everything the collector did since it was created
#[derive(Debug, Default)]
pub struct GcMetrics {
    passes: AtomicU64,
    deleted: AtomicU64,
    ghosted: AtomicU64,
    erased: AtomicU64,
    action_failures: AtomicU64,
    compactions: AtomicU64,
    compaction_failures: AtomicU64,
    skipped_triggers: AtomicU64,
}

impl GcMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass_completed(&self, report: &PassReport) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.deleted.fetch_add(report.deleted as u64, Ordering::Relaxed);
        self.ghosted.fetch_add(report.ghosted as u64, Ordering::Relaxed);
        self.erased.fetch_add(report.erased as u64, Ordering::Relaxed);
        self.action_failures
            .fetch_add(report.failures.len() as u64, Ordering::Relaxed);
        tracing::debug!(counter = "passes", "Metric incremented");
    }

    pub fn compaction_completed(&self, ok: bool) {
        if ok {
            self.compactions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(counter = "compactions", "Metric incremented");
        } else {
            self.compaction_failures.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(counter = "compaction_failures", "Metric incremented");
        }
    }

    pub fn trigger_skipped(&self) {
        self.skipped_triggers.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "skipped_triggers", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            ghosted: self.ghosted.load(Ordering::Relaxed),
            erased: self.erased.load(Ordering::Relaxed),
            action_failures: self.action_failures.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            compaction_failures: self.compaction_failures.load(Ordering::Relaxed),
            skipped_triggers: self.skipped_triggers.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub passes: u64,
    pub deleted: u64,
    pub ghosted: u64,
    pub erased: u64,
    pub action_failures: u64,
    pub compactions: u64,
    pub compaction_failures: u64,
    pub skipped_triggers: u64,
}
