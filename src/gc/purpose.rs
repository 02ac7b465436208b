use std::fmt;

use async_trait::async_trait;

use crate::log::{LogError, Msg, MsgId, Record, TangleId};

/// What the collector should do with a message under its tangle's goal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Purpose {
    /// Wanted by a goal; never touched
    Goal,
    /// Not wanted; deleted
    None,
    /// Tombstoned in `tangle`, then deleted
    Ghost { tangle: TangleId, span: u32 },
    /// Needed only for tangle linkage; payload erased
    Trail,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Purpose::Goal => f.write_str("goal"),
            Purpose::None => f.write_str("none"),
            Purpose::Ghost { .. } => f.write_str("ghost"),
            Purpose::Trail => f.write_str("trail"),
        }
    }
}

/// Resolves the purpose of a message; implemented by the goals engine
#[async_trait]
pub trait PurposeClassifier: Send + Sync {
    async fn classify(&self, id: &MsgId, msg: &Msg) -> Result<Purpose, LogError>;

    /// One result per record of a pass snapshot, in the same order
    ///
    /// Classifiers that need a record's neighbours should override this and
    /// work from the snapshot instead of querying the log once per record.
    async fn classify_snapshot(&self, records: &[Record]) -> Vec<Result<Purpose, LogError>> {
        let mut purposes = Vec::with_capacity(records.len());
        for record in records {
            purposes.push(self.classify(&record.id, &record.msg).await);
        }
        purposes
    }
}
