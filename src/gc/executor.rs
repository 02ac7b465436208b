//! Retention pass: classify every record once, act on it, join all actions

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::purpose::{Purpose, PurposeClassifier};
use super::report::{ActionError, Applied, ErrorChain, PassReport};
use crate::log::{GhostSpec, LogError, LogStore, MsgId, TangleId};

/// Storage action decided for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Delete,
    Ghost { tangle: TangleId, span: u32 },
    Erase,
}

pub struct RetentionExecutor {
    store: Arc<dyn LogStore>,
    classifier: Arc<dyn PurposeClassifier>,
}

impl RetentionExecutor {
    pub fn new(store: Arc<dyn LogStore>, classifier: Arc<dyn PurposeClassifier>) -> Self {
        Self { store, classifier }
    }

    /// Run one pass over a snapshot of the log
    ///
    /// Only a failed snapshot fails the pass. Everything per record lands in the
    /// report, and all actions are issued before any of them is awaited.
    pub async fn run_pass(&self) -> Result<PassReport, LogError> {
        debug!("cleanup-per-purpose started");
        let snapshot = self.store.records().await?;

        let mut report = PassReport {
            scanned: snapshot.len(),
            ..PassReport::default()
        };

        // Classify everything before the first mutation so that no decision
        // sees a tangle half-way through this pass
        let mut purposes = self.classifier.classify_snapshot(&snapshot).await.into_iter();
        let mut planned = Vec::new();
        for record in &snapshot {
            let classified = purposes.next().unwrap_or_else(|| {
                Err(LogError::Unavailable("classifier skipped the record".to_string()))
            });
            let purpose = match classified {
                Ok(purpose) => purpose,
                Err(source) => {
                    let error = ActionError::Classify { source };
                    warn!(id = %record.id, error = %ErrorChain(&error), "gc action failed");
                    report.absorb(record.id.clone(), Err(error));
                    continue;
                }
            };

            match purpose {
                Purpose::Goal => report.kept += 1,
                Purpose::None => planned.push((record.id.clone(), Action::Delete)),
                Purpose::Ghost { tangle, span } => {
                    planned.push((record.id.clone(), Action::Ghost { tangle, span }))
                }
                Purpose::Trail if record.is_erased() => report.already_erased += 1,
                Purpose::Trail => planned.push((record.id.clone(), Action::Erase)),
            }
        }

        let issued: Vec<(MsgId, JoinHandle<Result<Applied, ActionError>>)> = planned
            .into_iter()
            .map(|(id, action)| {
                let store = self.store.clone();
                let task_id = id.clone();
                let handle = tokio::spawn(async move { apply(store.as_ref(), &task_id, action).await });
                (id, handle)
            })
            .collect();

        for (id, handle) in issued {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => Err(ActionError::Aborted(join_error.to_string())),
            };
            if let Err(error) = &result {
                warn!(%id, error = %ErrorChain(error), "gc action failed");
            }
            report.absorb(id, result);
        }

        match report.outcome() {
            Ok(()) => debug!(
                scanned = report.scanned,
                deleted = report.deleted,
                ghosted = report.ghosted,
                erased = report.erased,
                "cleanup-per-purpose ended"
            ),
            Err(notice) => debug!(error = %notice, "cleanup-per-purpose ended with an error"),
        }
        Ok(report)
    }
}

/// Apply one action; a ghost is registered before its record is deleted
pub async fn apply(store: &dyn LogStore, id: &MsgId, action: Action) -> Result<Applied, ActionError> {
    match action {
        Action::Delete => {
            store
                .delete(id)
                .await
                .map_err(|source| ActionError::Delete { source })?;
            Ok(Applied::Deleted)
        }
        Action::Ghost { tangle, span } => {
            store
                .add_ghost(GhostSpec {
                    tangle,
                    msg: id.clone(),
                    span,
                })
                .await
                .map_err(|source| ActionError::AddGhost { source })?;
            store
                .delete(id)
                .await
                .map_err(|source| ActionError::Delete { source })?;
            Ok(Applied::Ghosted)
        }
        Action::Erase => {
            store
                .erase(id)
                .await
                .map_err(|source| ActionError::Erase { source })?;
            Ok(Applied::Erased)
        }
    }
}
