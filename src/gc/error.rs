use thiserror::Error;

#[derive(Debug, Error)]
pub enum GcError {
    #[error("gc requires a maximum log size (pass one to start or set gc.max_log_bytes)")]
    MissingSizeBudget,

    #[error("gc cycle task failed: {0}")]
    CycleTask(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, GcError>;
