/// Append-only message log consumed by the garbage collector
///
/// The collector never owns the log. It talks to it through [`LogStore`], which
/// covers the storage engine surface it needs:
///
/// - snapshot enumeration, lookup by id and by tangle
/// - delete (record fully removed) and erase (payload dropped, linkage kept)
/// - the ghost registry, holding tombstones for deleted tangle members
/// - size statistics and compaction
/// - record-added notifications
///
/// Two engines ship with the crate: [`MemoryLog`] for tests and embedding, and
/// [`FjallLog`], backed by a fjall keyspace on disk.
///
/// ## Byte accounting
///
/// Appends grow `total_bytes`. Deletes and erases grow `deleted_bytes` by the
/// bytes they made obsolete; that space only returns once `compact()` runs, so
/// stats read right after a burst of deletes still show the old total.

pub mod error;
pub mod memory;
pub mod partitions;
pub mod store;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use error::{LogError, Result};
pub use memory::MemoryLog;
pub use store::FjallLog;

/// Opaque message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MsgId(String);

/// Tangles are identified by the id of their moot
pub type TangleId = MsgId;

impl MsgId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh time-ordered id
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MsgId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A message as stored in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Msg {
    pub tangle: TangleId,
    /// Distance from the moot (the moot itself is depth 0)
    pub depth: u64,
    /// Tangle predecessors
    #[serde(default)]
    pub prev: Vec<MsgId>,
    pub domain: String,
    /// Payload; `None` for moots and erased messages
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Msg {
    pub fn moot(tangle: TangleId, domain: impl Into<String>) -> Self {
        Self {
            tangle,
            depth: 0,
            prev: Vec::new(),
            domain: domain.into(),
            data: None,
        }
    }

    pub fn encoded_len(&self) -> Result<u64> {
        Ok(serde_json::to_vec(self)?.len() as u64)
    }
}

/// A live entry of the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: MsgId,
    pub msg: Msg,
    /// Encoded size currently occupied in the log
    pub size: u64,
}

impl Record {
    pub fn new(id: MsgId, msg: Msg) -> Result<Self> {
        let size = msg.encoded_len()?;
        Ok(Self { id, msg, size })
    }

    /// Message kept for linkage only, payload dropped
    pub fn is_erased(&self) -> bool {
        self.msg.data.is_none()
    }

    pub fn is_moot(&self) -> bool {
        self.msg.depth == 0 && self.id == self.msg.tangle
    }

    /// Drop the payload, returning the number of bytes released
    pub(crate) fn strip_payload(&mut self) -> Result<u64> {
        if self.msg.data.take().is_none() {
            return Ok(0);
        }
        let before = self.size;
        self.size = self.msg.encoded_len()?;
        Ok(before.saturating_sub(self.size))
    }
}

/// Tombstone marking that `msg` once sat in `tangle`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostSpec {
    pub tangle: TangleId,
    pub msg: MsgId,
    /// Number of depths of ghosts the tangle keeps
    pub span: u32,
}

/// Aggregate size of the log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStats {
    pub total_bytes: u64,
    pub deleted_bytes: u64,
}

/// Storage engine surface used by the garbage collector
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Snapshot of all live records in append order
    async fn records(&self) -> Result<Vec<Record>>;

    async fn get(&self, id: &MsgId) -> Result<Option<Record>>;

    /// Live members of one tangle, moot included
    async fn tangle(&self, tangle: &TangleId) -> Result<Vec<Record>> {
        Ok(self
            .records()
            .await?
            .into_iter()
            .filter(|rec| &rec.msg.tangle == tangle)
            .collect())
    }

    async fn append(&self, id: MsgId, msg: Msg) -> Result<Record>;

    async fn delete(&self, id: &MsgId) -> Result<()>;

    /// Drop the payload but keep the message; no-op when already erased
    async fn erase(&self, id: &MsgId) -> Result<()>;

    async fn add_ghost(&self, ghost: GhostSpec) -> Result<()>;

    /// Ghosted message ids of a tangle, oldest first
    async fn ghosts(&self, tangle: &TangleId) -> Result<Vec<MsgId>>;

    async fn stats(&self) -> Result<LogStats>;

    /// Reclaim the space of deleted and erased records
    async fn compact(&self) -> Result<()>;

    /// Every appended record id is announced here; drop the receiver to unsubscribe
    fn subscribe_record_added(&self) -> broadcast::Receiver<MsgId>;
}

/// Append the moot of a new tangle
pub async fn create_tangle(store: &dyn LogStore, domain: &str) -> Result<TangleId> {
    let id = MsgId::generate();
    store.append(id.clone(), Msg::moot(id.clone(), domain)).await?;
    Ok(id)
}

/// Append a message on top of the current tip of `tangle`
pub async fn publish(
    store: &dyn LogStore,
    tangle: &TangleId,
    data: serde_json::Value,
) -> Result<Record> {
    let members = store.tangle(tangle).await?;
    let tip = members
        .iter()
        .max_by_key(|rec| rec.msg.depth)
        .ok_or_else(|| LogError::NotFound(tangle.clone()))?;

    let msg = Msg {
        tangle: tangle.clone(),
        depth: tip.msg.depth + 1,
        prev: vec![tip.id.clone()],
        domain: tip.msg.domain.clone(),
        data: Some(data),
    };
    store.append(MsgId::generate(), msg).await
}
