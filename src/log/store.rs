use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use fjall::{Batch, Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::error::{LogError, Result};
use super::partitions::{
    decode_ghost_key, decode_seq, encode_ghost_key, encode_ghost_prefix, encode_index_key,
    encode_meta_key, encode_record_key, encode_seq, encode_tangle_key, encode_tangle_prefix,
};
use super::{GhostSpec, LogStats, LogStore, Msg, MsgId, Record, TangleId};

const META_COUNTERS: &str = "counters";
const NOTIFY_CAPACITY: usize = 1024;

/// Sequence and byte counters, persisted alongside the records
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct Counters {
    next_seq: u64,
    total_bytes: u64,
    deleted_bytes: u64,
}

/// Fjall-backed persistent message log
pub struct FjallLog {
    keyspace: Keyspace,
    records: PartitionHandle,
    index: PartitionHandle,
    tangles: PartitionHandle,
    ghosts: PartitionHandle,
    metadata: PartitionHandle,
    // Serializes writers; held only for synchronous fjall calls
    counters: Mutex<Counters>,
    added: broadcast::Sender<MsgId>,
}

impl FjallLog {
    /// Open or create a log at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall log at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let records = keyspace.open_partition("records", PartitionCreateOptions::default())?;
        let index = keyspace.open_partition("index", PartitionCreateOptions::default())?;
        let tangles = keyspace.open_partition("tangles", PartitionCreateOptions::default())?;
        let ghosts = keyspace.open_partition("ghosts", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let counters = match metadata.get(encode_meta_key(META_COUNTERS))? {
            Some(value) => serde_json::from_slice(&value)?,
            None => Counters::default(),
        };
        debug!(?counters, "Loaded log counters");

        let (added, _) = broadcast::channel(NOTIFY_CAPACITY);
        info!("Fjall log opened successfully");
        Ok(Self {
            keyspace,
            records,
            index,
            tangles,
            ghosts,
            metadata,
            counters: Mutex::new(counters),
            added,
        })
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Counters>> {
        self.counters
            .lock()
            .map_err(|_| LogError::Unavailable("fjall log lock poisoned".to_string()))
    }

    fn stage_counters(&self, batch: &mut Batch, counters: &Counters) -> Result<()> {
        batch.insert(
            &self.metadata,
            encode_meta_key(META_COUNTERS),
            serde_json::to_vec(counters)?,
        );
        Ok(())
    }

    fn seq_of(&self, id: &MsgId) -> Result<Option<u64>> {
        match self.index.get(encode_index_key(id))? {
            Some(value) => decode_seq(&value)
                .map(Some)
                .ok_or_else(|| LogError::InvalidKey(format!("index entry for {}", id))),
            None => Ok(None),
        }
    }

    fn load(&self, seq: u64) -> Result<Option<Record>> {
        match self.records.get(encode_record_key(seq))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn load_live(&self, id: &MsgId) -> Result<(u64, Record)> {
        let seq = self
            .seq_of(id)?
            .ok_or_else(|| LogError::NotFound(id.clone()))?;
        let record = self.load(seq)?.ok_or_else(|| LogError::NotFound(id.clone()))?;
        Ok((seq, record))
    }
}

#[async_trait]
impl LogStore for FjallLog {
    async fn records(&self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for item in self.records.iter() {
            let (_, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    async fn get(&self, id: &MsgId) -> Result<Option<Record>> {
        match self.seq_of(id)? {
            Some(seq) => self.load(seq),
            None => Ok(None),
        }
    }

    async fn tangle(&self, tangle: &TangleId) -> Result<Vec<Record>> {
        let mut members = Vec::new();
        for item in self.tangles.prefix(encode_tangle_prefix(tangle)) {
            let (key, value) = item?;
            let seq = decode_seq(&value).ok_or_else(|| {
                LogError::InvalidKey(String::from_utf8_lossy(&key).to_string())
            })?;
            if let Some(record) = self.load(seq)? {
                members.push(record);
            }
        }
        Ok(members)
    }

    async fn append(&self, id: MsgId, msg: Msg) -> Result<Record> {
        let record = Record::new(id.clone(), msg)?;
        {
            let mut counters = self.lock()?;
            if self.seq_of(&id)?.is_some() {
                return Err(LogError::AlreadyExists(id));
            }
            let seq = counters.next_seq;
            let next = Counters {
                next_seq: seq + 1,
                total_bytes: counters.total_bytes + record.size,
                ..*counters
            };

            let mut batch = self.keyspace.batch();
            batch.insert(
                &self.records,
                encode_record_key(seq),
                serde_json::to_vec(&record)?,
            );
            batch.insert(&self.index, encode_index_key(&id), encode_seq(seq));
            batch.insert(
                &self.tangles,
                encode_tangle_key(&record.msg.tangle, record.msg.depth, &id),
                encode_seq(seq),
            );
            self.stage_counters(&mut batch, &next)?;
            batch.commit()?;
            *counters = next;
        }
        debug!(%id, size = record.size, "Appended record");
        let _ = self.added.send(id);
        Ok(record)
    }

    async fn delete(&self, id: &MsgId) -> Result<()> {
        let mut counters = self.lock()?;
        let (seq, record) = self.load_live(id)?;
        let next = Counters {
            deleted_bytes: counters.deleted_bytes + record.size,
            ..*counters
        };

        let mut batch = self.keyspace.batch();
        batch.remove(&self.records, encode_record_key(seq));
        batch.remove(&self.index, encode_index_key(id));
        batch.remove(
            &self.tangles,
            encode_tangle_key(&record.msg.tangle, record.msg.depth, id),
        );
        self.stage_counters(&mut batch, &next)?;
        batch.commit()?;
        *counters = next;
        debug!(%id, size = record.size, "Deleted record");
        Ok(())
    }

    async fn erase(&self, id: &MsgId) -> Result<()> {
        let mut counters = self.lock()?;
        let (seq, mut record) = self.load_live(id)?;
        let released = record.strip_payload()?;
        if released == 0 {
            return Ok(());
        }
        let next = Counters {
            deleted_bytes: counters.deleted_bytes + released,
            ..*counters
        };

        let mut batch = self.keyspace.batch();
        batch.insert(
            &self.records,
            encode_record_key(seq),
            serde_json::to_vec(&record)?,
        );
        self.stage_counters(&mut batch, &next)?;
        batch.commit()?;
        *counters = next;
        debug!(%id, released, "Erased record payload");
        Ok(())
    }

    async fn add_ghost(&self, ghost: GhostSpec) -> Result<()> {
        let _counters = self.lock()?;
        let (_, record) = self.load_live(&ghost.msg)?;

        let mut existing = Vec::new();
        for item in self.ghosts.prefix(encode_ghost_prefix(&ghost.tangle)) {
            let (key, _) = item?;
            if let Some(entry) = decode_ghost_key(&ghost.tangle, &key) {
                existing.push(entry);
            }
        }
        if existing.iter().any(|(_, id)| id == &ghost.msg) {
            return Ok(());
        }

        let mut batch = self.keyspace.batch();
        batch.insert(
            &self.ghosts,
            encode_ghost_key(&ghost.tangle, record.msg.depth, &ghost.msg),
            ghost.span.to_be_bytes().to_vec(),
        );
        existing.push((record.msg.depth, ghost.msg.clone()));

        let span = u64::from(ghost.span.max(1));
        let newest = existing.iter().map(|(depth, _)| *depth).max().unwrap_or(0);
        for (depth, id) in existing {
            if depth.saturating_add(span) <= newest {
                batch.remove(&self.ghosts, encode_ghost_key(&ghost.tangle, depth, &id));
            }
        }
        batch.commit()?;
        Ok(())
    }

    async fn ghosts(&self, tangle: &TangleId) -> Result<Vec<MsgId>> {
        let mut ids = Vec::new();
        for item in self.ghosts.prefix(encode_ghost_prefix(tangle)) {
            let (key, _) = item?;
            let (_, id) = decode_ghost_key(tangle, &key).ok_or_else(|| {
                LogError::InvalidKey(String::from_utf8_lossy(&key).to_string())
            })?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn stats(&self) -> Result<LogStats> {
        let counters = self.lock()?;
        Ok(LogStats {
            total_bytes: counters.total_bytes,
            deleted_bytes: counters.deleted_bytes,
        })
    }

    async fn compact(&self) -> Result<()> {
        let mut counters = self.lock()?;
        let reclaimed = counters.deleted_bytes;
        let next = Counters {
            total_bytes: counters.total_bytes.saturating_sub(reclaimed),
            deleted_bytes: 0,
            ..*counters
        };

        let mut batch = self.keyspace.batch();
        self.stage_counters(&mut batch, &next)?;
        batch.commit()?;
        *counters = next;
        // Tombstoned entries are dropped by fjall's own compaction once flushed
        self.persist()?;
        info!(reclaimed, "Compacted Fjall log");
        Ok(())
    }

    fn subscribe_record_added(&self) -> broadcast::Receiver<MsgId> {
        self.added.subscribe()
    }
}
