//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub activity: ActivityConfig,

    #[serde(default)]
    pub cutoff: CutoffConfig,

    #[serde(default)]
    pub devices: DevicesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Refresh intervals for the dashboard views
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_deployments_interval")]
    pub deployments_interval_ms: u64,

    #[serde(default = "default_devices_interval")]
    pub devices_interval_ms: u64,

    #[serde(default = "default_report_interval")]
    pub report_interval_ms: u64,

    /// Delay before retrying a failed refresh; defaults to the view's interval
    pub retry_delay_ms: Option<u64>,
}

fn default_deployments_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_devices_interval() -> u64 {
    30_000
}

fn default_report_interval() -> u64 {
    5_000
}

impl PollingConfig {
    pub fn deployments_interval(&self) -> Duration {
        Duration::from_millis(self.deployments_interval_ms)
    }

    pub fn devices_interval(&self) -> Duration {
        Duration::from_millis(self.devices_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn retry_delay(&self) -> Option<Duration> {
        self.retry_delay_ms.map(Duration::from_millis)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            deployments_interval_ms: default_deployments_interval(),
            devices_interval_ms: default_devices_interval(),
            report_interval_ms: default_report_interval(),
            retry_delay_ms: None,
        }
    }
}

/// Local persistent storage
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_store_file")]
    pub store_file: String,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("fleetpulse").to_string_lossy().to_string())
        .unwrap_or_else(|| "./fleetpulse_data".to_string())
}

fn default_store_file() -> String {
    "local_storage.json".to_string()
}

impl StorageConfig {
    /// Path of the durable key/value file
    pub fn store_path(&self) -> PathBuf {
        let data_dir = match (self.data_dir.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(&self.data_dir),
        };
        data_dir.join(&self.store_file)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            store_file: default_store_file(),
        }
    }
}

/// Daily activity history
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "default_history_key")]
    pub history_key: String,

    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

fn default_history_key() -> String {
    crate::activity::tracker::DEFAULT_HISTORY_KEY.to_string()
}

fn default_window_size() -> usize {
    crate::activity::DEFAULT_WINDOW_SIZE
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            history_key: default_history_key(),
            window_size: default_window_size(),
        }
    }
}

/// Last-checked cutoff
#[derive(Debug, Clone, Deserialize)]
pub struct CutoffConfig {
    #[serde(default = "default_cutoff_key")]
    pub key: String,

    #[serde(default = "default_session_key")]
    pub session_key: String,

    /// Sessions older than this re-advance the cutoff; unset means never
    pub session_max_age_secs: Option<u64>,
}

fn default_cutoff_key() -> String {
    crate::cutoff::DEFAULT_CUTOFF_KEY.to_string()
}

fn default_session_key() -> String {
    crate::cutoff::DEFAULT_SESSION_KEY.to_string()
}

impl CutoffConfig {
    pub fn session_max_age(&self) -> Option<chrono::Duration> {
        self.session_max_age_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(chrono::Duration::seconds)
    }
}

impl Default for CutoffConfig {
    fn default() -> Self {
        Self {
            key: default_cutoff_key(),
            session_key: default_session_key(),
            session_max_age_secs: None,
        }
    }
}

/// Devices dashboard
#[derive(Debug, Clone, Deserialize)]
pub struct DevicesConfig {
    #[serde(default = "default_device_limit")]
    pub deployment_device_limit: u64,
}

fn default_device_limit() -> u64 {
    crate::fleet::DEFAULT_DEPLOYMENT_DEVICE_LIMIT
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            deployment_device_limit: default_device_limit(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_toml(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("fleetpulse").join("config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = std::env::var("FLEETPULSE_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }

        if let Some(ms) = env_u64("FLEETPULSE_DEPLOYMENTS_INTERVAL_MS") {
            self.polling.deployments_interval_ms = ms;
        }
        if let Some(ms) = env_u64("FLEETPULSE_DEVICES_INTERVAL_MS") {
            self.polling.devices_interval_ms = ms;
        }
        if let Some(ms) = env_u64("FLEETPULSE_REPORT_INTERVAL_MS") {
            self.polling.report_interval_ms = ms;
        }
        if let Some(ms) = env_u64("FLEETPULSE_RETRY_DELAY_MS") {
            self.polling.retry_delay_ms = Some(ms);
        }

        if let Some(secs) = env_u64("FLEETPULSE_SESSION_MAX_AGE_SECS") {
            self.cutoff.session_max_age_secs = Some(secs);
        }

        if let Ok(level) = std::env::var("FLEETPULSE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("FLEETPULSE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let value = std::env::var(name).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Ignoring non-numeric {}={:?}", name, value);
            None
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# FleetPulse Configuration
#
# Environment variables override these settings:
# - FLEETPULSE_DATA_DIR
# - FLEETPULSE_DEPLOYMENTS_INTERVAL_MS
# - FLEETPULSE_DEVICES_INTERVAL_MS
# - FLEETPULSE_REPORT_INTERVAL_MS
# - FLEETPULSE_RETRY_DELAY_MS
# - FLEETPULSE_SESSION_MAX_AGE_SECS
# - FLEETPULSE_LOG_LEVEL
# - FLEETPULSE_LOG_FORMAT

[polling]
# How often the deployments dashboard refreshes (ms)
deployments_interval_ms = 30000

# How often the devices dashboard refreshes (ms)
devices_interval_ms = 30000

# How often an open deployment report refreshes (ms)
report_interval_ms = 5000

# Delay before retrying a failed refresh (ms), defaults to the view interval
# retry_delay_ms = 10000

[storage]
# Directory holding the local key/value store
data_dir = "~/.local/share/fleetpulse"

# File name of the key/value store inside data_dir
store_file = "local_storage.json"

[activity]
# Storage key of the daily activity history
history_key = "dailyDeviceActivityCount"

# Number of days kept
window_size = 7

[cutoff]
# Storage key of the last-checked timestamp
key = "deploymentChecker"

# Session-scoped marker key
session_key = "sessionDeploymentChecker"

# Re-advance the cutoff when a session is older than this (seconds)
# session_max_age_secs = 86400

[devices]
# Stop refreshing devices when more than this many are accepted
deployment_device_limit = 5000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.polling.deployments_interval(), Duration::from_secs(30));
        assert_eq!(config.polling.report_interval(), Duration::from_secs(5));
        assert!(config.polling.retry_delay().is_none());
        assert_eq!(config.activity.window_size, 7);
        assert_eq!(config.cutoff.key, "deploymentChecker");
        assert!(config.cutoff.session_max_age().is_none());
        assert_eq!(config.devices.deployment_device_limit, 5000);
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::from_toml(&generate_default_config()).unwrap();
        assert_eq!(config.polling.devices_interval_ms, 30_000);
        assert_eq!(config.storage.store_file, "local_storage.json");
        assert_eq!(config.activity.history_key, "dailyDeviceActivityCount");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_config() {
        let config = Config::from_toml(
            r#"
            [polling]
            report_interval_ms = 1000
            retry_delay_ms = 2500

            [cutoff]
            session_max_age_secs = 3600
            "#,
        )
        .unwrap();

        assert_eq!(config.polling.report_interval(), Duration::from_secs(1));
        assert_eq!(config.polling.deployments_interval_ms, 30_000);
        assert_eq!(config.polling.retry_delay(), Some(Duration::from_millis(2500)));
        assert_eq!(config.cutoff.session_max_age(), Some(chrono::Duration::hours(1)));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/fleetpulse.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[polling\nbroken").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }
}
