//! Goal-based purpose classification
//!
//! A goal says how much of a tangle to keep. [`GoalBook`] holds the goal of
//! every tangle and answers the collector's [`PurposeClassifier`] queries by
//! looking at the tangle's current members.
//!
//! - `all`: keep everything
//! - `none`: keep nothing
//! - `newest-N`: keep the N newest depths; already-erased messages inside that
//!   window stay as trail
//! - `record` / `record-S`: keep the newest update of every field in
//!   `data.update`; the message right below the oldest kept update stays as
//!   trail, the S-1 below it become ghosts (S defaults to 2)
//!
//! Tangles without a goal are treated as `none`. The moot of a tangle that has
//! a goal is always kept.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::gc::{Purpose, PurposeClassifier};
use crate::log::{LogError, LogStore, Msg, MsgId, Record, TangleId};

pub const DEFAULT_GHOST_SPAN: u32 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GoalParseError {
    #[error("Unknown goal: {0}")]
    Unknown(String),

    #[error("Invalid goal count in '{0}', expected a positive integer")]
    InvalidCount(String),
}

/// Retention policy of one tangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
    All,
    None,
    Newest(u64),
    Record { ghost_span: u32 },
}

impl FromStr for Goal {
    type Err = GoalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "all" => return Ok(Goal::All),
            "none" => return Ok(Goal::None),
            "record" => {
                return Ok(Goal::Record {
                    ghost_span: DEFAULT_GHOST_SPAN,
                });
            }
            _ => {}
        }

        if let Some(count) = s.strip_prefix("newest-") {
            let count: u64 = count
                .parse()
                .map_err(|_| GoalParseError::InvalidCount(s.to_string()))?;
            if count == 0 {
                return Err(GoalParseError::InvalidCount(s.to_string()));
            }
            return Ok(Goal::Newest(count));
        }

        if let Some(span) = s.strip_prefix("record-") {
            let ghost_span = span
                .parse()
                .map_err(|_| GoalParseError::InvalidCount(s.to_string()))?;
            return Ok(Goal::Record { ghost_span });
        }

        Err(GoalParseError::Unknown(s.to_string()))
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::All => f.write_str("all"),
            Goal::None => f.write_str("none"),
            Goal::Newest(count) => write!(f, "newest-{}", count),
            Goal::Record { ghost_span } => write!(f, "record-{}", ghost_span),
        }
    }
}

/// Goals per tangle, classifying messages against a log
pub struct GoalBook {
    store: Arc<dyn LogStore>,
    goals: RwLock<HashMap<TangleId, Goal>>,
}

impl GoalBook {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self {
            store,
            goals: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, tangle: TangleId, goal: Goal) {
        self.goals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tangle, goal);
    }

    pub fn get(&self, tangle: &TangleId) -> Option<Goal> {
        self.goals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tangle)
            .copied()
    }

    fn all_goals(&self) -> HashMap<TangleId, Goal> {
        self.goals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PurposeClassifier for GoalBook {
    async fn classify(&self, id: &MsgId, msg: &Msg) -> Result<Purpose, LogError> {
        let goal = self.get(&msg.tangle);
        if !needs_members(goal, id, msg) {
            return Ok(shallow_purpose(goal));
        }

        let members = self.store.tangle(&msg.tangle).await?;
        let mut view = TangleView::default();
        for rec in &members {
            view.add(rec);
        }
        Ok(view.purpose(goal, id, msg))
    }

    /// Builds every tangle's view once from the snapshot itself
    async fn classify_snapshot(&self, records: &[Record]) -> Vec<Result<Purpose, LogError>> {
        let goals = self.all_goals();
        let mut views: HashMap<&TangleId, TangleView> = HashMap::new();
        for rec in records {
            if matches!(
                goals.get(&rec.msg.tangle),
                Some(Goal::Newest(_) | Goal::Record { .. })
            ) {
                views.entry(&rec.msg.tangle).or_default().add(rec);
            }
        }

        records
            .iter()
            .map(|rec| {
                let goal = goals.get(&rec.msg.tangle).copied();
                let purpose = match views.get(&rec.msg.tangle) {
                    Some(view) if needs_members(goal, &rec.id, &rec.msg) => {
                        view.purpose(goal, &rec.id, &rec.msg)
                    }
                    _ => shallow_purpose(goal),
                };
                Ok(purpose)
            })
            .collect()
    }
}

/// Whether the purpose depends on the other members of the tangle
fn needs_members(goal: Option<Goal>, id: &MsgId, msg: &Msg) -> bool {
    let is_moot = msg.depth == 0 && id == &msg.tangle;
    matches!(goal, Some(Goal::Newest(_) | Goal::Record { .. })) && !is_moot
}

/// Purpose when the tangle's members do not matter
fn shallow_purpose(goal: Option<Goal>) -> Purpose {
    match goal {
        Some(Goal::None) | None => Purpose::None,
        Some(_) => Purpose::Goal,
    }
}

/// What a goal needs to know about one tangle
#[derive(Debug, Default)]
struct TangleView {
    max_depth: u64,
    /// Newest update per field, as (depth, id)
    roots: HashMap<String, (u64, MsgId)>,
}

impl TangleView {
    fn add(&mut self, rec: &Record) {
        self.max_depth = self.max_depth.max(rec.msg.depth);

        let Some(update) = rec
            .msg
            .data
            .as_ref()
            .and_then(|data| data.get("update"))
            .and_then(|update| update.as_object())
        else {
            return;
        };
        for field in update.keys() {
            let newer = self
                .roots
                .get(field)
                .is_none_or(|(depth, _)| rec.msg.depth > *depth);
            if newer {
                self.roots
                    .insert(field.clone(), (rec.msg.depth, rec.id.clone()));
            }
        }
    }

    fn purpose(&self, goal: Option<Goal>, id: &MsgId, msg: &Msg) -> Purpose {
        match goal {
            Some(Goal::Newest(count)) => self.newest_purpose(msg, count),
            Some(Goal::Record { ghost_span }) => self.record_purpose(id, msg, ghost_span),
            other => shallow_purpose(other),
        }
    }

    fn newest_purpose(&self, msg: &Msg, count: u64) -> Purpose {
        let max_depth = self.max_depth.max(msg.depth);
        if max_depth - msg.depth >= count {
            Purpose::None
        } else if msg.data.is_none() {
            Purpose::Trail
        } else {
            Purpose::Goal
        }
    }

    fn record_purpose(&self, id: &MsgId, msg: &Msg, ghost_span: u32) -> Purpose {
        let Some(cutoff) = self.roots.values().map(|(depth, _)| *depth).min() else {
            return Purpose::None;
        };
        let is_root = self.roots.values().any(|(_, root)| root == id);

        if is_root {
            Purpose::Goal
        } else if msg.depth.saturating_add(1) >= cutoff {
            Purpose::Trail
        } else if ghost_span >= 2 && msg.depth.saturating_add(u64::from(ghost_span)) >= cutoff {
            Purpose::Ghost {
                tangle: msg.tangle.clone(),
                span: ghost_span,
            }
        } else {
            Purpose::None
        }
    }
}
