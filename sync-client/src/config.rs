//! Configuration loading for stride-sync.
//!
//! Configuration is loaded from a TOML file (default: `stride.toml`). Every
//! section and field is optional.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use stride_sync_core::BackoffPolicy;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncSettings {
    /// Local database configuration.
    #[serde(default)]
    pub storage: StorageSettings,
    /// Remote run service configuration.
    #[serde(default)]
    pub remote: RemoteSettings,
    /// Background sync configuration.
    #[serde(default)]
    pub sync: SchedulingSettings,
}

/// Local database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Path to the SQLite database file (default: stride.db).
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Remote run service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the run service (default: http://localhost:8080).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (default: 20).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Background sync configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulingSettings {
    /// Base delay of the exponential retry backoff in ms (default: 2000).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Attempts before a create/delete job gives up (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Interval of the periodic fetch in seconds (default: 1800).
    #[serde(default = "default_fetch_interval_secs")]
    pub fetch_interval_secs: u64,
    /// Delay before the first periodic fetch in seconds (default: 1800).
    #[serde(default = "default_fetch_initial_delay_secs")]
    pub fetch_initial_delay_secs: u64,
    /// How often the job executor polls for due jobs in ms (default: 1000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("stride.db")
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_backoff_base_ms() -> u64 {
    2_000
}

fn default_max_attempts() -> u32 {
    stride_sync_core::MAX_ATTEMPTS
}

fn default_fetch_interval_secs() -> u64 {
    30 * 60
}

fn default_fetch_initial_delay_secs() -> u64 {
    30 * 60
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base_ms(),
            max_attempts: default_max_attempts(),
            fetch_interval_secs: default_fetch_interval_secs(),
            fetch_initial_delay_secs: default_fetch_initial_delay_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl RemoteSettings {
    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SchedulingSettings {
    /// Retry policy for deferred jobs.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::exponential(Duration::from_millis(self.backoff_base_ms))
    }

    /// Repeat interval of the periodic fetch.
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }

    /// Delay before the first periodic fetch.
    pub fn fetch_initial_delay(&self) -> Duration {
        Duration::from_secs(self.fetch_initial_delay_secs)
    }

    /// Executor poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl SyncSettings {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let settings = SyncSettings::default();
        assert_eq!(settings.storage.database, PathBuf::from("stride.db"));
        assert_eq!(settings.remote.request_timeout(), Duration::from_secs(20));
        assert_eq!(settings.sync.max_attempts, 5);
        assert_eq!(settings.sync.backoff().base(), Duration::from_secs(2));
        assert_eq!(settings.sync.fetch_interval(), Duration::from_secs(1800));
        assert_eq!(settings.sync.fetch_initial_delay(), Duration::from_secs(1800));
    }

    #[test]
    fn settings_from_toml_string() {
        let toml = r#"
[storage]
database = "/data/runs.db"

[remote]
base_url = "https://runs.example.com"

[sync]
backoff_base_ms = 500
fetch_interval_secs = 900
"#;

        let settings: SyncSettings = toml::from_str(toml).unwrap();
        assert_eq!(settings.storage.database, PathBuf::from("/data/runs.db"));
        assert_eq!(settings.remote.base_url, "https://runs.example.com");
        assert_eq!(settings.remote.request_timeout_secs, 20);
        assert_eq!(settings.sync.backoff().base(), Duration::from_millis(500));
        assert_eq!(settings.sync.fetch_interval(), Duration::from_secs(900));
        assert_eq!(settings.sync.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let settings: SyncSettings = toml::from_str("").unwrap();
        assert_eq!(settings.remote.base_url, "http://localhost:8080");
        assert_eq!(settings.sync.max_attempts, 5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SyncSettings::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.storage.database, PathBuf::from("stride.db"));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stride.toml");
        std::fs::write(&path, "[sync]\nmax_attempts = \"many\"\n").unwrap();

        let result = SyncSettings::from_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }
}
