use super::models::Config;
use crate::goals::{Goal, GoalParseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("gc.max_log_bytes must be positive")]
    InvalidMaxLogBytes,

    #[error("log.path must not be empty")]
    EmptyLogPath,

    #[error("Invalid goal for tangle '{tangle}': {source}")]
    InvalidGoal {
        tangle: String,
        #[source]
        source: GoalParseError,
    },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_gc(config)?;
    validate_log(config)?;
    validate_goals(config)?;
    Ok(())
}

/// A configured size budget must be usable
fn validate_gc(config: &Config) -> Result<(), ValidationError> {
    if let Some(max_log_bytes) = config.gc.max_log_bytes {
        if max_log_bytes.as_u64() == 0 {
            return Err(ValidationError::InvalidMaxLogBytes);
        }
    }
    Ok(())
}

fn validate_log(config: &Config) -> Result<(), ValidationError> {
    if config.log.path.as_os_str().is_empty() {
        return Err(ValidationError::EmptyLogPath);
    }
    Ok(())
}

/// Every goal string must parse
fn validate_goals(config: &Config) -> Result<(), ValidationError> {
    for (tangle, goal) in &config.goals {
        goal.parse::<Goal>()
            .map_err(|source| ValidationError::InvalidGoal {
                tangle: tangle.clone(),
                source,
            })?;
    }
    Ok(())
}
