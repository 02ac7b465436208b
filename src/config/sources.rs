use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "TANGLEGC_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/tanglegc.toml";
const ENV_PREFIX: &str = "TANGLEGC";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_sources(config_path)
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // TANGLEGC__GC__MAX_LOG_BYTES -> gc.max_log_bytes
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.gc.compaction_interval_ms, 120_000);
        assert_eq!(config.log.path, PathBuf::from("data/log"));
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[gc]
max_log_bytes = "100MB"
compaction_interval_ms = 5000

[log]
path = "/var/lib/tanglegc/log"

[goals]
"0190f5c2-account" = "all"
"0190f5c2-posts" = "newest-3"

[telemetry]
log_filter = "tanglegc=debug"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(
            config.gc.max_log_bytes.unwrap().as_u64(),
            100 * 1024 * 1024
        );
        assert_eq!(config.gc.compaction_interval_ms, 5000);
        assert_eq!(config.log.path, PathBuf::from("/var/lib/tanglegc/log"));
        assert_eq!(config.goals.len(), 2);
        assert_eq!(config.goals["0190f5c2-posts"], "newest-3");
        assert_eq!(config.telemetry.log_filter, "tanglegc=debug");
    }

    // Note: environment overrides are not tested here since env::set_var is unsafe
}
