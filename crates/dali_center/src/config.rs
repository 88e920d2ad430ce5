//! Configuration file parsing and structures.
//!
//! dali_center uses TOML for declarative configuration. Each native
//! integration owns a statically typed section (e.g. `[dali_center]`).

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

use crate::integrations::dali_center::DaliCenterConfig;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub api: ApiConfig,

    /// DALI Center gateways; the integration stays off without this section
    #[serde(default)]
    pub dali_center: Option<DaliCenterConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
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

    /// Per-target levels, e.g. `"dali_center::engine" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the tracing filter for this config
    pub fn targets(&self) -> Targets {
        self.overrides
            .iter()
            .fold(Targets::new().with_default(self.level), |t, (target, level)| {
                t.with_target(target.clone(), *level)
            })
    }
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8565
}

/// Native HTTP API configuration
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        contents.parse()
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.api.listen, "127.0.0.1");
        assert_eq!(config.api.port, 8565);
        assert!(config.dali_center.is_none());
    }

    #[test]
    fn test_parse_logging_overrides() {
        let config: Config = r#"
            [logging]
            level = "warn"

            [logging.overrides]
            "dali_center::integrations" = "debug"
        "#
        .parse()
        .unwrap();

        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(
            config.logging.overrides["dali_center::integrations"],
            LogLevel::Debug
        );
        let targets = config.logging.targets();
        assert!(targets.would_enable(
            "dali_center::integrations::dali_center",
            &tracing::Level::DEBUG
        ));
        assert!(!targets.would_enable("dali_center::engine", &tracing::Level::INFO));
        assert!(targets.would_enable("dali_center::engine", &tracing::Level::WARN));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dali_center.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
            [api]
            port = 9000

            [dali_center.entries.office]
            serial_number = "6A242121110E"
            host = "192.168.1.20"
            "#
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.api.port, 9000);
        let dali = config.dali_center.unwrap();
        assert_eq!(dali.entries["office"].host, "192.168.1.20");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
    }
}
