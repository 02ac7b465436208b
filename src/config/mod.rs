//! Configuration management for tanglegc
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use tanglegc::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Log stored at: {}", config.log.path.display());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `TANGLEGC__<section>__<key>`
//!
//! Examples:
//! - `TANGLEGC__GC__MAX_LOG_BYTES=100MB`
//! - `TANGLEGC__GC__COMPACTION_INTERVAL_MS=60000`
//! - `TANGLEGC__GC__CHECK_INTERVAL_MS=0` (disable the periodic size check)
//! - `TANGLEGC__LOG__PATH=/var/lib/tanglegc/log`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/tanglegc.toml`.
//! This can be overridden using the `TANGLEGC_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

use std::collections::HashMap;

pub use crate::humanize::ByteSize;
pub use models::{Config, GcConfig, LogConfig, TelemetryConfig};
pub use validation::ValidationError;

use crate::goals::Goal;
use crate::log::TangleId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`TANGLEGC__*`)
    /// 2. TOML file (default: `config/tanglegc.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (zero budget, unknown goal, etc.)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Parsed goals per tangle
    ///
    /// Entries that fail to parse are skipped; `load` already rejects them.
    pub fn parsed_goals(&self) -> HashMap<TangleId, Goal> {
        self.goals
            .iter()
            .filter_map(|(tangle, goal)| Some((TangleId::new(tangle.as_str()), goal.parse().ok()?)))
            .collect()
    }
}
