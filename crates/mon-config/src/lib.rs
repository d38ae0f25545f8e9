//! CLI parsing plus a layered file/env/CLI configuration for the knobs that
//! benefit from file-based tuning (poll intervals, retention, batch size).
//! Precedence, lowest to highest: built-in defaults, `config.toml`,
//! environment variables, CLI flags.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

/// Command-line surface. Every tunable also has a `MONITOR_AGENT_...` env
/// fallback via clap's `env` attribute, matching the reference agent's
/// CLI/env duality.
#[derive(Parser, Debug)]
#[command(name = "monitor-agent")]
#[command(about = "Single-node health check monitoring agent")]
pub struct Args {
    /// Path to the SQLite database file.
    #[arg(long, env = "MONITOR_AGENT_DB")]
    pub db: PathBuf,

    /// Optional path to a layered config.toml; if unset, standard search
    /// paths are tried before falling back to built-in defaults.
    #[arg(long, env = "MONITOR_AGENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Scheduler poll interval, in seconds.
    #[arg(long, env = "MONITOR_AGENT_INTERVAL")]
    pub interval: Option<u64>,

    /// Cleaner sweep interval, in seconds.
    #[arg(long = "cleanup-interval", env = "MONITOR_AGENT_CLEANUP_INTERVAL")]
    pub cleanup_interval: Option<u64>,

    /// How long a result is retained before the cleaner deletes it, in seconds.
    #[arg(long = "retention-period", env = "MONITOR_AGENT_RETENTION_PERIOD")]
    pub retention_period: Option<u64>,

    /// Rows deleted per cleaner batch.
    #[arg(long = "batch-size", env = "MONITOR_AGENT_BATCH_SIZE")]
    pub batch_size: Option<u32>,

    /// Disable the retention cleaner entirely.
    #[arg(long = "disable-cleaner", env = "MONITOR_AGENT_DISABLE_CLEANER")]
    pub disable_cleaner: bool,

    /// Maximum number of checks executed concurrently per batch.
    #[arg(long = "max-concurrency", env = "MONITOR_AGENT_MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,

    /// Log level, also settable via `RUST_LOG`.
    #[arg(long = "log-level", env = "MONITOR_AGENT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Enable the Telegram notifier sink. Requires `TELEGRAM_BOT_TOKEN` and
    /// `TELEGRAM_CHAT_ID` in the environment.
    #[arg(long = "enable-telegram", env = "MONITOR_AGENT_ENABLE_TELEGRAM")]
    pub enable_telegram: bool,
}

/// The file/env layer. Every field has a built-in default so a missing or
/// partial `config.toml` is never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub interval_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub retention_period_seconds: u64,
    pub batch_size: u32,
    pub max_concurrency: usize,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5,
            cleanup_interval_seconds: 3600,
            retention_period_seconds: 86_400,
            batch_size: 1000,
            max_concurrency: 16,
        }
    }
}

const CONFIG_SEARCH_PATHS: &[&str] = &["config.toml", "monitor-agent.toml", "/etc/monitor-agent/config.toml"];

impl FileConfig {
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads from an explicit path if given, else the first existing search
    /// path, else built-in defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }
        for candidate in CONFIG_SEARCH_PATHS {
            let candidate = Path::new(candidate);
            if candidate.exists() {
                tracing::info!(?candidate, "loading configuration file");
                return Self::from_file(candidate);
            }
        }
        Ok(Self::default())
    }
}

/// Fully resolved runtime configuration: the file/default layer with CLI (or
/// CLI-level env fallback) overrides applied on top.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub db_path: PathBuf,
    pub poll_interval: std::time::Duration,
    pub cleanup_interval: std::time::Duration,
    pub retention_period: std::time::Duration,
    pub batch_size: u32,
    pub max_concurrency: usize,
    pub disable_cleaner: bool,
    pub log_level: Option<String>,
    pub enable_telegram: bool,
}

impl RuntimeConfig {
    pub fn resolve(args: Args) -> Result<Self, ConfigError> {
        let file = FileConfig::load(args.config.as_deref())?;

        Ok(Self {
            db_path: args.db,
            poll_interval: std::time::Duration::from_secs(args.interval.unwrap_or(file.interval_seconds)),
            cleanup_interval: std::time::Duration::from_secs(
                args.cleanup_interval.unwrap_or(file.cleanup_interval_seconds),
            ),
            retention_period: std::time::Duration::from_secs(
                args.retention_period.unwrap_or(file.retention_period_seconds),
            ),
            batch_size: args.batch_size.unwrap_or(file.batch_size),
            max_concurrency: args.max_concurrency.unwrap_or(file.max_concurrency),
            disable_cleaner: args.disable_cleaner,
            log_level: args.log_level,
            enable_telegram: args.enable_telegram,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args(db: &str) -> Args {
        Args {
            db: PathBuf::from(db),
            config: None,
            interval: None,
            cleanup_interval: None,
            retention_period: None,
            batch_size: None,
            disable_cleaner: false,
            max_concurrency: None,
            log_level: None,
            enable_telegram: false,
        }
    }

    #[test]
    fn unset_cli_fields_fall_back_to_built_in_defaults() {
        let resolved = RuntimeConfig::resolve(base_args("test.db")).unwrap();
        assert_eq!(resolved.poll_interval, std::time::Duration::from_secs(5));
        assert_eq!(resolved.batch_size, 1000);
    }

    #[test]
    fn explicit_cli_value_overrides_the_default() {
        let mut args = base_args("test.db");
        args.interval = Some(30);
        let resolved = RuntimeConfig::resolve(args).unwrap();
        assert_eq!(resolved.poll_interval, std::time::Duration::from_secs(30));
    }

    #[test]
    fn file_config_overrides_built_in_defaults_when_no_cli_value_given() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "batch_size = 42\n").unwrap();

        let mut args = base_args("test.db");
        args.config = Some(path);
        let resolved = RuntimeConfig::resolve(args).unwrap();
        assert_eq!(resolved.batch_size, 42);
        assert_eq!(resolved.cleanup_interval, std::time::Duration::from_secs(3600));
    }
}
