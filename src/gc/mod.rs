/// Garbage collection engine for the message log
///
/// Components, leaves first:
///
/// - [`report`]: fan-in of per-record outcomes into a [`PassReport`]
/// - [`executor`]: one retention pass, mapping each record's [`Purpose`] to a
///   storage action (goal: keep, none: delete, ghost: tombstone then delete,
///   trail: erase)
/// - [`monitor`]: insertion counting and the size thresholds
/// - [`scheduler`]: the single-flight [`GarbageCollector`] tying it together
///
/// ## Thresholds
///
/// - Cleanup: log above 80% of its size budget
/// - Compaction: more than 30% of the log is deleted bytes
///
/// Both are fixed policy, not configuration.

pub mod error;
pub mod executor;
pub mod monitor;
pub mod purpose;
pub mod report;
pub mod scheduler;

pub use error::{GcError, Result};
pub use executor::{Action, RetentionExecutor};
pub use monitor::{LogMonitor, Verdict};
pub use purpose::{Purpose, PurposeClassifier};
pub use report::{ActionError, ActionFailure, Applied, CycleReport, PassFailed, PassReport};
pub use scheduler::{CheckOutcome, GarbageCollector, GcSettings};
