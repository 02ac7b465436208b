//! Fan-in of per-record outcomes
//!
//! Every action of a retention pass ends up here, successful or not. A failed
//! action never aborts the pass; it is kept with its cause and the pass as a
//! whole reports an advisory [`PassFailed`].

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::log::{LogError, MsgId};

/// Failure of a single record's action, with the storage error that caused it
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("gc failed to classify message")]
    Classify {
        #[source]
        source: LogError,
    },

    #[error("gc failed to add ghost")]
    AddGhost {
        #[source]
        source: LogError,
    },

    #[error("gc failed to delete message")]
    Delete {
        #[source]
        source: LogError,
    },

    #[error("gc failed to erase message")]
    Erase {
        #[source]
        source: LogError,
    },

    #[error("gc action task did not complete: {0}")]
    Aborted(String),
}

/// Side effect of a completed action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Deleted,
    Ghosted,
    Erased,
}

#[derive(Debug)]
pub struct ActionFailure {
    pub id: MsgId,
    pub error: ActionError,
}

/// Advisory notice that at least one action of a pass failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{failed} of {attempted} gc actions failed")]
pub struct PassFailed {
    pub failed: usize,
    pub attempted: usize,
}

/// Outcome of one retention pass
#[derive(Debug, Default)]
pub struct PassReport {
    /// Records in the snapshot the pass worked from
    pub scanned: usize,
    pub kept: usize,
    pub deleted: usize,
    pub ghosted: usize,
    pub erased: usize,
    /// Trail records skipped because their payload was already gone
    pub already_erased: usize,
    pub failures: Vec<ActionFailure>,
}

impl PassReport {
    pub fn absorb(&mut self, id: MsgId, result: Result<Applied, ActionError>) {
        match result {
            Ok(Applied::Deleted) => self.deleted += 1,
            Ok(Applied::Ghosted) => self.ghosted += 1,
            Ok(Applied::Erased) => self.erased += 1,
            Err(error) => self.failures.push(ActionFailure { id, error }),
        }
    }

    /// Actions issued against the store, plus classification failures
    pub fn attempted(&self) -> usize {
        self.deleted + self.ghosted + self.erased + self.failures.len()
    }

    /// Whether the pass mutated nothing
    pub fn is_noop(&self) -> bool {
        self.deleted + self.ghosted + self.erased == 0
    }

    pub fn outcome(&self) -> Result<(), PassFailed> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(PassFailed {
                failed: self.failures.len(),
                attempted: self.attempted(),
            })
        }
    }
}

/// Result of one scheduler cycle: retention pass, then compaction
#[derive(Debug, Default)]
pub struct CycleReport {
    /// `None` when the cycle only needed compaction
    pub pass: Option<Result<PassReport, LogError>>,
    pub compaction: Option<Result<(), LogError>>,
}

impl CycleReport {
    pub fn pass_report(&self) -> Option<&PassReport> {
        self.pass.as_ref().and_then(|pass| pass.as_ref().ok())
    }

    pub fn compacted(&self) -> bool {
        matches!(self.compaction, Some(Ok(())))
    }
}

/// Renders an error with all of its causes: `outer: inner: root`
pub struct ErrorChain<'a>(pub &'a (dyn StdError + 'static));

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(cause) = source {
            write!(f, ": {}", cause)?;
            source = cause.source();
        }
        Ok(())
    }
}
