//! Configuration file parsing and structures.
//!
//! duerosd uses TOML for declarative configuration. Each DuerOS account is one entry under
//! `[integrations.dueros.<entry_id>]`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing_subscriber::filter::{LevelFilter, Targets};

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP API; disabled when the section is absent
    #[serde(default)]
    pub api: Option<ApiConfig>,

    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"duerosd::integrations::dueros" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the per-target filter used by the tracing subscriber
    pub fn targets(&self) -> Targets {
        self.overrides
            .iter()
            .fold(Targets::new().with_default(self.level), |targets, (target, level)| {
                targets.with_target(target.clone(), *level)
            })
    }
}

fn default_api_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8565
}

/// Native HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

/// Integration configuration container
#[derive(Debug, Default, Deserialize)]
pub struct IntegrationsConfig {
    /// DuerOS accounts. Key = entry_id
    #[serde(default)]
    pub dueros: BTreeMap<String, DuerosEntryConfig>,
}

fn default_enabled() -> bool {
    true
}

fn default_update_interval_secs() -> u64 {
    300
}

fn default_base_url() -> String {
    "https://xiaodu.baidu.com".to_string()
}

/// One DuerOS account
#[derive(Clone, Deserialize)]
pub struct DuerosEntryConfig {
    /// Display name of the account
    pub username: String,

    /// Baidu session token (the `BDUSS` cookie)
    pub bduss: String,

    /// Whether this entry is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Polling interval for the appliance list
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,

    /// Root of the DuerOS web API
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

// Manual impl so the session token never ends up in logs
impl fmt::Debug for DuerosEntryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuerosEntryConfig")
            .field("username", &self.username)
            .field("bduss", &"<redacted>")
            .field("enabled", &self.enabled)
            .field("update_interval_secs", &self.update_interval_secs)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot work
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (entry_id, entry) in &self.integrations.dueros {
            if entry.bduss.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "integrations.dueros.{entry_id}.bduss must not be empty"
                )));
            }
            if entry.update_interval_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "integrations.dueros.{entry_id}.update_interval_secs must be greater than 0"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [logging]
            level = "info"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.api.is_none());
        assert!(config.integrations.dueros.is_empty());
    }

    #[test]
    fn test_parse_dueros_entry() {
        let toml = r#"
            [api]
            port = 9000

            [integrations.dueros.home]
            username = "alice"
            bduss = "secret-token"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        let api = config.api.as_ref().unwrap();
        assert_eq!(api.listen, "127.0.0.1");
        assert_eq!(api.port, 9000);

        let entry = config.integrations.dueros.get("home").unwrap();
        assert_eq!(entry.username, "alice");
        assert!(entry.enabled);
        assert_eq!(entry.update_interval_secs, 300);
        assert_eq!(entry.base_url, "https://xiaodu.baidu.com");
        assert!(!format!("{:?}", entry).contains("secret-token"));
    }

    #[test]
    fn test_logging_overrides() {
        let toml = r#"
            [logging]
            level = "warning"

            [logging.overrides]
            "duerosd::integrations::dueros" = "debug"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.level, LogLevel::Warn);

        let targets = config.logging.targets();
        assert!(targets.would_enable("duerosd::integrations::dueros::coordinator", &tracing::Level::DEBUG));
        assert!(!targets.would_enable("duerosd::engine", &tracing::Level::INFO));
    }

    #[test]
    fn test_from_file_rejects_empty_token() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [integrations.dueros.home]
            username = "alice"
            bduss = ""
            "#
        )
        .unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
    }
}
