use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub gc: GcConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// Tangle id -> goal (e.g. "all", "newest-3", "record-2")
    #[serde(default)]
    pub goals: BTreeMap<String, String>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Garbage collector configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GcConfig {
    /// Size budget of the log; may also be given when starting the collector
    pub max_log_bytes: Option<ByteSize>,
    /// Minimum spacing between automatic compactions
    #[serde(default = "default_compaction_interval_ms")]
    pub compaction_interval_ms: u64,
    /// Period of the self-triggered size check; 0 disables it
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            max_log_bytes: None,
            compaction_interval_ms: default_compaction_interval_ms(),
            check_interval_ms: default_check_interval_ms(),
        }
    }
}

fn default_compaction_interval_ms() -> u64 {
    120_000
}

fn default_check_interval_ms() -> u64 {
    60_000
}

/// Log storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
        }
    }
}

fn default_log_path() -> PathBuf {
    PathBuf::from("data/log")
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Tracing filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
