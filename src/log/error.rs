use thiserror::Error;

use super::MsgId;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message not found: {0}")]
    NotFound(MsgId),

    #[error("Message already exists: {0}")]
    AlreadyExists(MsgId),

    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    #[error("Log unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LogError>;
