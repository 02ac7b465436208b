//! Single-flight scheduling of retention passes and compactions
//!
//! One cycle is a retention pass followed by a compaction. Cycles are mutually
//! exclusive: automatic ones are skipped while another cycle holds the guard,
//! forced ones wait for it. Insertions keep being counted either way.
//!
//! Besides insertion checkpoints, the monitor can sample the log on a fixed
//! period, which catches growth caused by writers outside this process.
//!
//! ```rust,ignore
//! let gc = GarbageCollector::new(store, goals, GcSettings::default());
//! gc.start(Some(100 * 1024 * 1024))?;
//! let report = gc.force_immediately().await?;
//! gc.stop();
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::error::{GcError, Result};
use super::executor::RetentionExecutor;
use super::monitor::{LogMonitor, Verdict};
use super::purpose::PurposeClassifier;
use super::report::{CycleReport, ErrorChain};
use crate::config::GcConfig;
use crate::log::{LogError, LogStore};
use crate::observability::{GcMetrics, MetricsSnapshot};

/// Minimum spacing between two automatic compactions
pub const DEFAULT_COMPACTION_INTERVAL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct GcSettings {
    /// Budget used when `start` is called without one
    pub max_log_bytes: Option<u64>,
    pub compaction_interval: Duration,
    /// Period of the self-triggered size check; `None` relies on insertions only
    pub check_interval: Option<Duration>,
}

impl Default for GcSettings {
    fn default() -> Self {
        Self {
            max_log_bytes: None,
            compaction_interval: DEFAULT_COMPACTION_INTERVAL,
            check_interval: None,
        }
    }
}

impl From<&GcConfig> for GcSettings {
    fn from(config: &GcConfig) -> Self {
        Self {
            max_log_bytes: config.max_log_bytes.map(|size| size.as_u64()),
            compaction_interval: Duration::from_millis(config.compaction_interval_ms),
            check_interval: Some(config.check_interval_ms)
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }
}

/// Why a cycle started
#[derive(Debug, Clone, Copy)]
enum Trigger {
    Threshold(Verdict),
    Forced,
}

/// Result of one monitor evaluation
#[derive(Debug)]
pub enum CheckOutcome {
    NotStarted,
    /// Stats query failed; the next checkpoint tries again
    StatsUnavailable,
    BelowThresholds(Verdict),
    AlreadyRunning(Verdict),
    Scheduled(JoinHandle<CycleReport>),
}

struct Shared {
    store: Arc<dyn LogStore>,
    executor: RetentionExecutor,
    // Held for a whole cycle; the only thing that marks the collector as running
    guard: Arc<AsyncMutex<()>>,
    settings: GcSettings,
    last_compacted: Mutex<Instant>,
    metrics: GcMetrics,
}

struct MonitorTask {
    monitor: Arc<LogMonitor>,
    task: JoinHandle<()>,
}

/// Garbage collector for one log
pub struct GarbageCollector {
    shared: Arc<Shared>,
    monitor: Mutex<Option<MonitorTask>>,
}

impl GarbageCollector {
    pub fn new(
        store: Arc<dyn LogStore>,
        classifier: Arc<dyn PurposeClassifier>,
        settings: GcSettings,
    ) -> Self {
        let shared = Shared {
            executor: RetentionExecutor::new(store.clone(), classifier),
            store,
            guard: Arc::new(AsyncMutex::new(())),
            settings,
            last_compacted: Mutex::new(Instant::now()),
            metrics: GcMetrics::new(),
        };
        Self {
            shared: Arc::new(shared),
            monitor: Mutex::new(None),
        }
    }

    /// Start monitoring the log against a size budget
    ///
    /// Falls back to the configured budget when `max_log_bytes` is `None`.
    /// Restarts the monitor if it was already running. Must be called from
    /// within a Tokio runtime.
    pub fn start(&self, max_log_bytes: Option<u64>) -> Result<()> {
        let budget = max_log_bytes
            .or(self.shared.settings.max_log_bytes)
            .filter(|bytes| *bytes > 0)
            .ok_or(GcError::MissingSizeBudget)?;

        self.stop();

        let monitor = Arc::new(LogMonitor::new(budget));
        // Subscribe before spawning so no insertion slips through
        let mut added = self.shared.store.subscribe_record_added();
        let shared = self.shared.clone();
        let task_monitor = monitor.clone();

        let mut ticker = self.shared.settings.check_interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        let task = tokio::spawn(async move {
            shared.check_log_size(&task_monitor).await;
            loop {
                tokio::select! {
                    received = added.recv() => {
                        let count = match received {
                            Ok(_) => 1,
                            Err(RecvError::Lagged(missed)) => missed,
                            Err(RecvError::Closed) => break,
                        };
                        if task_monitor.record_added(count) {
                            shared.check_log_size(&task_monitor).await;
                        }
                    }
                    _ = next_tick(&mut ticker) => {
                        shared.check_log_size(&task_monitor).await;
                    }
                }
            }
            debug!("record-added stream closed, log monitor exiting");
        });

        info!(
            max_log_bytes = budget,
            checkpoint = monitor.checkpoint(),
            "gc started"
        );
        *self.lock_monitor() = Some(MonitorTask { monitor, task });
        Ok(())
    }

    /// Stop future triggers; a cycle already in flight runs to completion
    pub fn stop(&self) {
        if let Some(running) = self.lock_monitor().take() {
            running.task.abort();
            info!("gc stopped");
        }
    }

    pub fn is_started(&self) -> bool {
        self.lock_monitor().is_some()
    }

    /// Whether a cycle currently holds the single-flight guard
    pub fn is_running(&self) -> bool {
        self.shared.guard.try_lock().is_err()
    }

    /// Wait until no cycle holds the single-flight guard
    ///
    /// Pair with `stop()` before shutting down so that a cycle in flight
    /// finishes its pass and compaction.
    pub async fn wait_idle(&self) {
        let _idle = self.shared.guard.lock().await;
    }

    /// Sample the log now, as a checkpoint would
    pub async fn check_log_size(&self) -> CheckOutcome {
        let monitor = match self.lock_monitor().as_ref() {
            Some(running) => running.monitor.clone(),
            None => return CheckOutcome::NotStarted,
        };
        self.shared.check_log_size(&monitor).await
    }

    /// Run a retention pass and a compaction right away, ignoring thresholds
    ///
    /// Waits for any cycle in flight first. The cycle runs on its own task, so
    /// dropping the returned future does not interrupt it.
    pub async fn force_immediately(&self) -> Result<CycleReport> {
        debug!("force immediately");
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            let permit = shared.guard.clone().lock_owned().await;
            shared.run_cycle(Trigger::Forced, permit).await
        });
        Ok(handle.await?)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    fn lock_monitor(&self) -> MutexGuard<'_, Option<MonitorTask>> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl Drop for GarbageCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    async fn check_log_size(self: &Arc<Self>, monitor: &LogMonitor) -> CheckOutcome {
        let stats = match self.store.stats().await {
            Ok(stats) => stats,
            Err(err) => {
                debug!(error = %err, "log stats unavailable, waiting for next checkpoint");
                return CheckOutcome::StatsUnavailable;
            }
        };

        let verdict = monitor.evaluate(stats);
        if !verdict.triggered() {
            return CheckOutcome::BelowThresholds(verdict);
        }

        let permit = match self.guard.clone().try_lock_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.metrics.trigger_skipped();
                debug!(
                    percent_used = verdict.percent_used,
                    percent_deleted = verdict.percent_deleted,
                    "gc cycle already in flight, skipping trigger"
                );
                return CheckOutcome::AlreadyRunning(verdict);
            }
        };

        let shared = self.clone();
        CheckOutcome::Scheduled(tokio::spawn(async move {
            shared.run_cycle(Trigger::Threshold(verdict), permit).await
        }))
    }

    /// Pass then compaction; the guard is released when `_permit` drops
    async fn run_cycle(&self, trigger: Trigger, _permit: OwnedMutexGuard<()>) -> CycleReport {
        let run_pass = match trigger {
            Trigger::Forced => true,
            Trigger::Threshold(verdict) => {
                debug!(
                    percent_used = verdict.percent_used,
                    percent_deleted = verdict.percent_deleted,
                    needs_cleanup = verdict.needs_cleanup,
                    needs_compaction = verdict.needs_compaction,
                    "gc thresholds crossed"
                );
                verdict.needs_cleanup
            }
        };

        let mut report = CycleReport::default();
        if run_pass {
            let pass = self.executor.run_pass().await;
            match &pass {
                Ok(pass_report) => {
                    self.metrics.pass_completed(pass_report);
                    if !pass_report.is_noop() {
                        info!(
                            deleted = pass_report.deleted,
                            ghosted = pass_report.ghosted,
                            erased = pass_report.erased,
                            "retention pass completed"
                        );
                    }
                    if let Err(notice) = pass_report.outcome() {
                        warn!(error = %notice, "retention pass finished with failures");
                    }
                }
                Err(err) => {
                    warn!(error = %ErrorChain(err), "retention pass could not snapshot the log")
                }
            }
            report.pass = Some(pass);
        }

        if let Trigger::Threshold(_) = trigger {
            let next = self.last_compacted() + self.settings.compaction_interval;
            if next > Instant::now() {
                debug!(wait_ms = (next - Instant::now()).as_millis() as u64, "compaction delayed");
                tokio::time::sleep_until(next).await;
            }
        }

        report.compaction = Some(self.compact().await);
        report
    }

    async fn compact(&self) -> std::result::Result<(), LogError> {
        debug!("compaction started");
        let result = self.store.compact().await;
        *self
            .last_compacted
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
        match &result {
            Ok(()) => debug!("compaction ended"),
            Err(err) => warn!(error = %ErrorChain(err), "compaction ended with an error"),
        }
        self.metrics.compaction_completed(result.is_ok());
        result
    }

    fn last_compacted(&self) -> Instant {
        *self
            .last_compacted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
