//! In-process log engine
//!
//! Records live in append-ordered slots. Deleting a record leaves a hole that
//! only disappears on `compact()`, mirroring how a file-backed log behaves.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::error::{LogError, Result};
use super::{GhostSpec, LogStats, LogStore, Msg, MsgId, Record, TangleId};

const NOTIFY_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct Inner {
    slots: Vec<Option<Record>>,
    index: HashMap<MsgId, usize>,
    ghosts: HashMap<TangleId, Vec<(MsgId, u64)>>,
    stats: LogStats,
}

impl Inner {
    fn live_mut(&mut self, id: &MsgId) -> Result<&mut Record> {
        let slot = *self
            .index
            .get(id)
            .ok_or_else(|| LogError::NotFound(id.clone()))?;
        self.slots[slot]
            .as_mut()
            .ok_or_else(|| LogError::NotFound(id.clone()))
    }
}

/// Log kept entirely in memory
pub struct MemoryLog {
    inner: Mutex<Inner>,
    added: broadcast::Sender<MsgId>,
}

impl MemoryLog {
    pub fn new() -> Self {
        let (added, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            added,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| LogError::Unavailable("memory log lock poisoned".to_string()))
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogStore for MemoryLog {
    async fn records(&self) -> Result<Vec<Record>> {
        let inner = self.lock()?;
        Ok(inner.slots.iter().flatten().cloned().collect())
    }

    async fn get(&self, id: &MsgId) -> Result<Option<Record>> {
        let inner = self.lock()?;
        Ok(inner
            .index
            .get(id)
            .and_then(|&slot| inner.slots[slot].clone()))
    }

    async fn tangle(&self, tangle: &TangleId) -> Result<Vec<Record>> {
        let inner = self.lock()?;
        Ok(inner
            .slots
            .iter()
            .flatten()
            .filter(|rec| &rec.msg.tangle == tangle)
            .cloned()
            .collect())
    }

    async fn append(&self, id: MsgId, msg: Msg) -> Result<Record> {
        let record = Record::new(id.clone(), msg)?;
        {
            let mut inner = self.lock()?;
            if inner.index.contains_key(&id) {
                return Err(LogError::AlreadyExists(id));
            }
            let slot = inner.slots.len();
            inner.slots.push(Some(record.clone()));
            inner.index.insert(id.clone(), slot);
            inner.stats.total_bytes += record.size;
        }
        // Nobody listening is fine
        let _ = self.added.send(id);
        Ok(record)
    }

    async fn delete(&self, id: &MsgId) -> Result<()> {
        let mut inner = self.lock()?;
        let slot = *inner
            .index
            .get(id)
            .ok_or_else(|| LogError::NotFound(id.clone()))?;
        let record = inner.slots[slot]
            .take()
            .ok_or_else(|| LogError::NotFound(id.clone()))?;
        inner.stats.deleted_bytes += record.size;
        debug!(%id, size = record.size, "Deleted record");
        Ok(())
    }

    async fn erase(&self, id: &MsgId) -> Result<()> {
        let mut inner = self.lock()?;
        let released = inner.live_mut(id)?.strip_payload()?;
        inner.stats.deleted_bytes += released;
        if released > 0 {
            debug!(%id, released, "Erased record payload");
        }
        Ok(())
    }

    async fn add_ghost(&self, ghost: GhostSpec) -> Result<()> {
        let mut inner = self.lock()?;
        let depth = inner.live_mut(&ghost.msg)?.msg.depth;
        let span = u64::from(ghost.span.max(1));

        let entries = inner.ghosts.entry(ghost.tangle).or_default();
        if entries.iter().any(|(id, _)| id == &ghost.msg) {
            return Ok(());
        }
        entries.push((ghost.msg, depth));
        entries.sort_by_key(|(_, depth)| *depth);

        let newest = entries.last().map(|(_, depth)| *depth).unwrap_or(depth);
        entries.retain(|(_, depth)| depth + span > newest);
        Ok(())
    }

    async fn ghosts(&self, tangle: &TangleId) -> Result<Vec<MsgId>> {
        let inner = self.lock()?;
        Ok(inner
            .ghosts
            .get(tangle)
            .map(|entries| entries.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default())
    }

    async fn stats(&self) -> Result<LogStats> {
        Ok(self.lock()?.stats)
    }

    async fn compact(&self) -> Result<()> {
        let mut inner = self.lock()?;
        let live: Vec<Record> = inner.slots.drain(..).flatten().collect();
        inner.index = live
            .iter()
            .enumerate()
            .map(|(slot, rec)| (rec.id.clone(), slot))
            .collect();
        inner.slots = live.into_iter().map(Some).collect();

        let reclaimed = inner.stats.deleted_bytes;
        inner.stats.total_bytes = inner.stats.total_bytes.saturating_sub(reclaimed);
        inner.stats.deleted_bytes = 0;
        debug!(reclaimed, "Compacted memory log");
        Ok(())
    }

    fn subscribe_record_added(&self) -> broadcast::Receiver<MsgId> {
        self.added.subscribe()
    }
}
