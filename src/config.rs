//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports a TOML config file and `GLUCOTRAY_*` environment overrides,
//! and writes the file back after credentials are entered.

use crate::analysis::Thresholds;
use crate::scheduler::PollSettings;
use crate::source::{CredentialError, Credentials, HttpSourceConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "glucotray";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: Credentials,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub token_url: String,

    #[serde(default)]
    pub account_url: String,

    #[serde(default)]
    pub readings_url: String,

    #[serde(default = "default_account_id_pointer")]
    pub account_id_pointer: String,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_account_id_pointer() -> String {
    "/0/UserID".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            token_url: String::new(),
            account_url: String::new(),
            readings_url: String::new(),
            account_id_pointer: default_account_id_pointer(),
            client_id: None,
            client_secret: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl SourceConfig {
    pub fn to_http_config(&self) -> HttpSourceConfig {
        HttpSourceConfig {
            token_url: self.token_url.clone(),
            account_url: self.account_url.clone(),
            readings_url: self.readings_url.clone(),
            account_id_pointer: self.account_id_pointer.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            request_timeout_secs: self.request_timeout_secs,
        }
    }
}

/// Local cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    app_dir().join("glucose.db").to_string_lossy().to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.db_path)
    }
}

/// Poll cadence and data windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_jitter")]
    pub jitter_secs: u64,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_window_hours")]
    pub fetch_window_hours: i64,

    #[serde(default = "default_window_hours")]
    pub retention_hours: i64,
}

fn default_interval() -> u64 {
    300 // 5 minutes
}

fn default_jitter() -> u64 {
    30
}

fn default_retry_delay() -> u64 {
    60
}

fn default_window_hours() -> i64 {
    24
}

/// Longest accepted fetch/retention window
pub const MAX_WINDOW_HOURS: i64 = 24 * 31;

/// Longest accepted poll interval or retry delay
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            jitter_secs: default_jitter(),
            retry_delay_secs: default_retry_delay(),
            fetch_window_hours: default_window_hours(),
            retention_hours: default_window_hours(),
        }
    }
}

impl PollingConfig {
    pub fn to_settings(&self) -> Result<PollSettings, ConfigError> {
        let window = |name: &str, hours: i64| {
            chrono::Duration::try_hours(hours).ok_or_else(|| {
                ConfigError::Invalid(format!("polling.{} is out of range: {}", name, hours))
            })
        };

        Ok(PollSettings {
            interval: std::time::Duration::from_secs(self.interval_secs),
            jitter: std::time::Duration::from_secs(self.jitter_secs),
            retry_delay: std::time::Duration::from_secs(self.retry_delay_secs),
            fetch_window: window("fetch_window_hours", self.fetch_window_hours)?,
            retention: window("retention_hours", self.retention_hours)?,
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    #[serde(default = "default_log_file")]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_file() -> Option<String> {
    Some(
        app_dir()
            .join("logs")
            .join("glucotray.log")
            .to_string_lossy()
            .to_string(),
    )
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: default_log_file(),
        }
    }
}

/// `<config dir>/glucotray`
pub fn app_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        app_dir().join("config.toml")
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Write configuration (including credentials) to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |e: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(io_err)?;

        tracing::debug!("Saved config to {:?}", path);
        Ok(())
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

    /// Load from the default location, falling back to defaults + environment
    pub fn load_default() -> Self {
        let path = Self::default_path();

        if path.exists() {
            match Self::load_with_env(&path) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load config from {:?}: {}", path, e);
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Check everything the poller needs before it starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.account.validate()?;

        for (name, url) in [
            ("source.token_url", &self.source.token_url),
            ("source.account_url", &self.source.account_url),
            ("source.readings_url", &self.source.readings_url),
        ] {
            if url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} is not set", name)));
            }
        }

        if !self.thresholds.is_ordered() {
            return Err(ConfigError::Invalid(
                "thresholds must satisfy low < normal_min < normal_max < high".into(),
            ));
        }

        let polling = &self.polling;

        if polling.interval_secs == 0 || polling.jitter_secs >= polling.interval_secs {
            return Err(ConfigError::Invalid(
                "polling.interval_secs must be positive and larger than polling.jitter_secs".into(),
            ));
        }

        if polling.interval_secs > MAX_INTERVAL_SECS || polling.retry_delay_secs > MAX_INTERVAL_SECS
        {
            return Err(ConfigError::Invalid(format!(
                "polling.interval_secs and polling.retry_delay_secs must not exceed {}",
                MAX_INTERVAL_SECS
            )));
        }

        for (name, hours) in [
            ("fetch_window_hours", polling.fetch_window_hours),
            ("retention_hours", polling.retention_hours),
        ] {
            if !(1..=MAX_WINDOW_HOURS).contains(&hours) {
                return Err(ConfigError::Invalid(format!(
                    "polling.{} must be between 1 and {} hours",
                    name, MAX_WINDOW_HOURS
                )));
            }
        }

        polling.to_settings().map(|_| ())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Account overrides
        if let Ok(username) = std::env::var("GLUCOTRAY_USERNAME") {
            self.account.username = username;
        }
        if let Ok(password) = std::env::var("GLUCOTRAY_PASSWORD") {
            self.account.password = password;
        }

        // Source overrides
        if let Ok(url) = std::env::var("GLUCOTRAY_TOKEN_URL") {
            self.source.token_url = url;
        }
        if let Ok(url) = std::env::var("GLUCOTRAY_ACCOUNT_URL") {
            self.source.account_url = url;
        }
        if let Ok(url) = std::env::var("GLUCOTRAY_READINGS_URL") {
            self.source.readings_url = url;
        }

        // Storage overrides
        if let Ok(db_path) = std::env::var("GLUCOTRAY_DB_PATH") {
            self.storage.db_path = db_path;
        }

        // Polling overrides
        if let Ok(interval) = std::env::var("GLUCOTRAY_POLL_INTERVAL_SECS") {
            if let Ok(secs) = interval.parse() {
                self.polling.interval_secs = secs;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("GLUCOTRAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("GLUCOTRAY_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(file) = std::env::var("GLUCOTRAY_LOG_FILE") {
            self.logging.file = if file.is_empty() { None } else { Some(file) };
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

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(#[from] CredentialError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Glucotray Configuration
#
# Environment variables override these settings:
# - GLUCOTRAY_USERNAME / GLUCOTRAY_PASSWORD
# - GLUCOTRAY_TOKEN_URL / GLUCOTRAY_ACCOUNT_URL / GLUCOTRAY_READINGS_URL
# - GLUCOTRAY_DB_PATH
# - GLUCOTRAY_POLL_INTERVAL_SECS
# - GLUCOTRAY_LOG_LEVEL / GLUCOTRAY_LOG_FORMAT / GLUCOTRAY_LOG_FILE

[account]
# Written by `glucotray login`
username = ""
password = ""

[source]
# Password-grant token endpoint
token_url = ""

# Returns the followed account(s); the id is found with account_id_pointer
account_url = ""
account_id_pointer = "/0/UserID"

# Returns a JSON array of {"EventDate": ..., "convertedValue": ...}
readings_url = ""

# Optional OAuth client credentials sent with the token request
# client_id = ""
# client_secret = ""

request_timeout_secs = 30

[storage]
# SQLite reading cache
# db_path = "~/.config/glucotray/glucose.db"

[polling]
# Seconds between fetches, randomised by +/- jitter_secs
interval_secs = 300
jitter_secs = 30

# Wait after a failed login before trying again
retry_delay_secs = 60

# Hours of history requested per fetch and kept in the cache
fetch_window_hours = 24
retention_hours = 24

[thresholds]
# mmol/L. Alerts fire below `low` and above `high`;
# the tray is green between normal_min and normal_max.
low = 4.0
high = 15.0
normal_min = 5.0
normal_max = 10.0

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Log file, appended to alongside console output
# file = "~/.config/glucotray/logs/glucotray.log"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn runnable() -> Config {
        let mut config = Config::default();
        config.account = Credentials::new("jane@example.com", "secret");
        config.source.token_url = "https://api.example.com/token".into();
        config.source.account_url = "https://api.example.com/account".into();
        config.source.readings_url = "https://api.example.com/readings".into();
        config
    }

    #[test]
    fn test_default_template_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();

        assert_eq!(config.polling.interval_secs, 300);
        assert_eq!(config.polling.jitter_secs, 30);
        assert_eq!(config.polling.retry_delay_secs, 60);
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.source.account_id_pointer, "/0/UserID");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [thresholds]
            low = 3.9

            [polling]
            interval_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.thresholds.low, 3.9);
        assert_eq!(config.thresholds.high, 15.0);
        assert_eq!(config.polling.interval_secs, 120);
        assert_eq!(config.polling.retention_hours, 24);
        assert!(config.storage.db_path.ends_with("glucose.db"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = runnable();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.account, config.account);
        assert_eq!(loaded.source.readings_url, config.source.readings_url);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[polling]\ninterval_secs = \"soon\"\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate() {
        assert!(runnable().validate().is_ok());

        let mut no_user = runnable();
        no_user.account.username = "jane".into();
        assert!(matches!(
            no_user.validate(),
            Err(ConfigError::InvalidCredentials(CredentialError::InvalidEmail))
        ));

        let mut no_url = runnable();
        no_url.source.readings_url.clear();
        assert!(matches!(no_url.validate(), Err(ConfigError::Invalid(_))));

        let mut bad_thresholds = runnable();
        bad_thresholds.thresholds.normal_max = 20.0;
        assert!(matches!(bad_thresholds.validate(), Err(ConfigError::Invalid(_))));

        let mut bad_jitter = runnable();
        bad_jitter.polling.jitter_secs = 400;
        assert!(matches!(bad_jitter.validate(), Err(ConfigError::Invalid(_))));

        let mut slow = runnable();
        slow.polling.interval_secs = u64::MAX;
        assert!(matches!(slow.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_windows() {
        let mut huge_fetch = runnable();
        huge_fetch.polling.fetch_window_hours = 1_000_000_000_000;
        assert!(matches!(huge_fetch.validate(), Err(ConfigError::Invalid(_))));

        let mut huge_retention = runnable();
        huge_retention.polling.retention_hours = MAX_WINDOW_HOURS + 1;
        assert!(matches!(huge_retention.validate(), Err(ConfigError::Invalid(_))));

        let mut month = runnable();
        month.polling.fetch_window_hours = MAX_WINDOW_HOURS;
        month.polling.retention_hours = MAX_WINDOW_HOURS;
        assert!(month.validate().is_ok());
    }

    #[test]
    fn test_poll_settings_out_of_range() {
        let polling = PollingConfig {
            fetch_window_hours: 3_000_000_000_000,
            ..PollingConfig::default()
        };
        assert!(matches!(polling.to_settings(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_poll_settings_conversion() {
        let settings = PollingConfig::default().to_settings().unwrap();

        assert_eq!(settings.interval, std::time::Duration::from_secs(300));
        assert_eq!(settings.jitter, std::time::Duration::from_secs(30));
        assert_eq!(settings.retry_delay, std::time::Duration::from_secs(60));
        assert_eq!(settings.fetch_window, chrono::Duration::hours(24));
        assert_eq!(settings.retention, chrono::Duration::hours(24));
    }
}
