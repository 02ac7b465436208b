//! Decides when the log deserves a look, and what the look found

use std::sync::atomic::{AtomicU64, Ordering};

use crate::log::LogStats;

/// Cleanup runs once the log uses more than this share of its budget
pub const CLEANUP_THRESHOLD_PERCENT: f64 = 80.0;

/// Compaction runs once more than this share of the log is deleted bytes
pub const COMPACTION_THRESHOLD_PERCENT: f64 = 30.0;

/// Share of the size budget that may be appended between two stats queries
pub const CHECKPOINT_BUDGET_FRACTION: f64 = 0.01;

/// Assumed size of an average record
pub const ESTIMATED_RECORD_BYTES: u64 = 500;

/// What one stats sample says about the log
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub stats: LogStats,
    pub percent_used: f64,
    pub percent_deleted: f64,
    pub needs_cleanup: bool,
    pub needs_compaction: bool,
}

impl Verdict {
    pub fn triggered(&self) -> bool {
        self.needs_cleanup || self.needs_compaction
    }
}

/// Insertion counter plus threshold policy for one size budget
#[derive(Debug)]
pub struct LogMonitor {
    max_log_bytes: u64,
    checkpoint: u64,
    inserted: AtomicU64,
}

impl LogMonitor {
    pub fn new(max_log_bytes: u64) -> Self {
        Self {
            max_log_bytes,
            checkpoint: checkpoint_for(max_log_bytes),
            inserted: AtomicU64::new(0),
        }
    }

    pub fn max_log_bytes(&self) -> u64 {
        self.max_log_bytes
    }

    /// Insertions between two stats queries
    pub fn checkpoint(&self) -> u64 {
        self.checkpoint
    }

    /// Insertions counted since the last checkpoint
    pub fn pending(&self) -> u64 {
        self.inserted.load(Ordering::Relaxed)
    }

    /// Count `count` new records; true once the checkpoint is reached, which
    /// also restarts the count
    pub fn record_added(&self, count: u64) -> bool {
        let seen = self.inserted.fetch_add(count, Ordering::AcqRel) + count;
        if seen < self.checkpoint {
            return false;
        }
        self.inserted.store(0, Ordering::Release);
        true
    }

    pub fn evaluate(&self, stats: LogStats) -> Verdict {
        let percent_used = if self.max_log_bytes == 0 {
            0.0
        } else {
            stats.total_bytes as f64 / self.max_log_bytes as f64 * 100.0
        };
        let percent_deleted = if stats.total_bytes == 0 {
            0.0
        } else {
            stats.deleted_bytes as f64 / stats.total_bytes as f64 * 100.0
        };

        Verdict {
            stats,
            percent_used,
            percent_deleted,
            needs_cleanup: percent_used > CLEANUP_THRESHOLD_PERCENT,
            needs_compaction: percent_deleted > COMPACTION_THRESHOLD_PERCENT,
        }
    }
}

/// Roughly 1% of the budget worth of records, at least one
pub fn checkpoint_for(max_log_bytes: u64) -> u64 {
    let records =
        (max_log_bytes as f64 * CHECKPOINT_BUDGET_FRACTION / ESTIMATED_RECORD_BYTES as f64).floor();
    (records as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total_bytes: u64, deleted_bytes: u64) -> LogStats {
        LogStats {
            total_bytes,
            deleted_bytes,
        }
    }

    #[test]
    fn test_checkpoint_is_one_percent_of_budget() {
        assert_eq!(checkpoint_for(100 * 1024 * 1024), 2097);
        assert_eq!(checkpoint_for(50_000), 1);
        assert_eq!(checkpoint_for(4 * 1024), 1);
        assert_eq!(checkpoint_for(0), 1);
    }

    #[test]
    fn test_record_added_resets_at_checkpoint() {
        let monitor = LogMonitor::new(150_000);
        assert_eq!(monitor.checkpoint(), 3);

        assert!(!monitor.record_added(1));
        assert!(!monitor.record_added(1));
        assert!(monitor.record_added(1));
        assert_eq!(monitor.pending(), 0);

        // A lagged burst counts all at once
        assert!(monitor.record_added(10));
        assert_eq!(monitor.pending(), 0);
    }

    #[test]
    fn test_cleanup_threshold_is_strict() {
        let monitor = LogMonitor::new(1000);
        assert!(!monitor.evaluate(stats(800, 0)).needs_cleanup);
        assert!(monitor.evaluate(stats(801, 0)).needs_cleanup);
    }

    #[test]
    fn test_compaction_threshold() {
        let monitor = LogMonitor::new(1_000_000);
        let below = monitor.evaluate(stats(1000, 300));
        assert!(!below.needs_compaction);
        assert!(!below.triggered());

        let above = monitor.evaluate(stats(1000, 301));
        assert!(above.needs_compaction);
        assert!(!above.needs_cleanup);
        assert!(above.triggered());
    }

    #[test]
    fn test_empty_log_has_nothing_deleted() {
        let monitor = LogMonitor::new(1000);
        let verdict = monitor.evaluate(stats(0, 0));
        assert_eq!(verdict.percent_deleted, 0.0);
        assert_eq!(verdict.percent_used, 0.0);
        assert!(!verdict.triggered());
    }
}
