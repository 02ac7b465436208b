//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tanglegc::log::{
    GhostSpec, LogError, LogStats, LogStore, MemoryLog, Msg, MsgId, Record, Result, TangleId,
};
use tokio::sync::{Semaphore, broadcast};

/// Text payloads of all records still carrying data, in log order
pub async fn texts(log: &dyn LogStore) -> Vec<String> {
    log.records()
        .await
        .unwrap()
        .into_iter()
        .filter_map(|rec| {
            rec.msg
                .data
                .as_ref()
                .and_then(|data| data.get("text"))
                .and_then(|text| text.as_str())
                .map(String::from)
        })
        .collect()
}

pub fn is_deleted(rec: &Option<Record>) -> bool {
    rec.is_none()
}

pub fn is_erased(rec: &Option<Record>) -> bool {
    rec.as_ref().is_some_and(|rec| rec.is_erased())
}

pub fn is_present(rec: &Option<Record>) -> bool {
    rec.as_ref().is_some_and(|rec| !rec.is_erased())
}

/// Poll `check` until it holds, failing the test after five seconds
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Memory log with switchable faults and a gate in front of compaction
pub struct FaultyLog {
    inner: MemoryLog,
    pub fail_ghosts: AtomicBool,
    pub fail_stats: AtomicBool,
    pub fail_compaction: AtomicBool,
    hold_compaction: AtomicBool,
    compaction_gate: Semaphore,
}

impl FaultyLog {
    pub fn new() -> Self {
        Self {
            inner: MemoryLog::new(),
            fail_ghosts: AtomicBool::new(false),
            fail_stats: AtomicBool::new(false),
            fail_compaction: AtomicBool::new(false),
            hold_compaction: AtomicBool::new(false),
            compaction_gate: Semaphore::new(0),
        }
    }

    /// Compactions block until `release_compactions` lets them through
    pub fn hold_compactions(&self) {
        self.hold_compaction.store(true, Ordering::SeqCst);
    }

    pub fn release_compactions(&self, count: usize) {
        self.compaction_gate.add_permits(count);
    }
}

fn injected(what: &str) -> LogError {
    LogError::Unavailable(format!("injected {} failure", what))
}

#[async_trait]
impl LogStore for FaultyLog {
    async fn records(&self) -> Result<Vec<Record>> {
        self.inner.records().await
    }

    async fn get(&self, id: &MsgId) -> Result<Option<Record>> {
        self.inner.get(id).await
    }

    async fn tangle(&self, tangle: &TangleId) -> Result<Vec<Record>> {
        self.inner.tangle(tangle).await
    }

    async fn append(&self, id: MsgId, msg: Msg) -> Result<Record> {
        self.inner.append(id, msg).await
    }

    async fn delete(&self, id: &MsgId) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn erase(&self, id: &MsgId) -> Result<()> {
        self.inner.erase(id).await
    }

    async fn add_ghost(&self, ghost: GhostSpec) -> Result<()> {
        if self.fail_ghosts.load(Ordering::SeqCst) {
            return Err(injected("ghost"));
        }
        self.inner.add_ghost(ghost).await
    }

    async fn ghosts(&self, tangle: &TangleId) -> Result<Vec<MsgId>> {
        self.inner.ghosts(tangle).await
    }

    async fn stats(&self) -> Result<LogStats> {
        if self.fail_stats.load(Ordering::SeqCst) {
            return Err(injected("stats"));
        }
        self.inner.stats().await
    }

    async fn compact(&self) -> Result<()> {
        if self.hold_compaction.load(Ordering::SeqCst) {
            self.compaction_gate
                .acquire()
                .await
                .expect("compaction gate closed")
                .forget();
        }
        if self.fail_compaction.load(Ordering::SeqCst) {
            return Err(injected("compaction"));
        }
        self.inner.compact().await
    }

    fn subscribe_record_added(&self) -> broadcast::Receiver<MsgId> {
        self.inner.subscribe_record_added()
    }
}
