//! Application configuration using Figment
//!
//! Configuration is layered, later sources win:
//! 1. Built-in defaults (serde)
//! 2. A TOML file (`--config`, or `pitaya.toml` when present)
//! 3. Environment variables prefixed with `PITAYA_`, nested keys separated
//!    by `__` (e.g. `PITAYA_BOARD__HOST=rp-f01234.local`)
//! 4. Command-line overrides merged by the caller
//!
//! # Example
//! ```no_run
//! use pitaya_board::config::AppConfig;
//!
//! let config = AppConfig::extract(AppConfig::figment(None)?)?;
//! println!("Board: {}:{}", config.board.host, config.board.port);
//! # Ok::<(), pitaya_board::config::ConfigError>(())
//! ```

use crate::logging::{parse_log_level, LogFormat};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use pitaya_core::config::{ConnectionConfig, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_PORT};
use pitaya_driver::RedPitayaBoardConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File read when no `--config` is given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "pitaya.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "PITAYA_";

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Explicit configuration file is missing
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    /// A layer could not be parsed or extracted
    #[error("Failed to load configuration: {0}")]
    Load(#[source] Box<figment::Error>),

    /// Values were loaded but are not usable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        Self::Load(Box::new(error))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Board connection settings
    #[serde(default)]
    pub board: BoardSection,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Board connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSection {
    /// Board hostname or IP address
    #[serde(default)]
    pub host: String,
    /// SCPI server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Automatic reconnects before giving up
    #[serde(default = "default_max_reconnect_attempts", alias = "reconnect")]
    pub max_reconnect_attempts: u32,
    /// Simulated board instead of hardware
    #[serde(default)]
    pub mock: bool,
    /// Timeout of acquisition application requests in ms
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

// Default value functions
fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_http_timeout_ms() -> u64 {
    pitaya_driver::acquisition::DEFAULT_HTTP_TIMEOUT_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            mock: false,
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl BoardSection {
    /// Driver configuration for this section.
    pub fn driver_config(&self) -> RedPitayaBoardConfig {
        let connection = ConnectionConfig::new(self.host.clone())
            .with_port(self.port)
            .with_max_reconnect_attempts(self.max_reconnect_attempts);
        RedPitayaBoardConfig {
            connection,
            mock: self.mock,
            http_timeout_ms: self.http_timeout_ms,
        }
    }
}

impl AppConfig {
    /// Defaults, file and environment layers.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn figment(path: Option<&Path>) -> Result<Figment, ConfigError> {
        let file = match path {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        // Defaults come from serde, so a file may use `reconnect` freely
        Ok(Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate.
    pub fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::extract(Self::figment(path)?)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.board
            .driver_config()
            .connection
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("board: {}", e)))?;

        if self.board.http_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "board: 'http_timeout_ms' cannot be 0".to_string(),
            ));
        }

        parse_log_level(&self.logging.level).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;

    fn valid() -> AppConfig {
        AppConfig {
            board: BoardSection {
                host: "rp-f01234.local".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.board.port, 18861);
        assert_eq!(config.board.max_reconnect_attempts, 10);
        assert_eq!(config.logging.level, "info");
        assert!(!config.board.mock);
    }

    #[test]
    fn test_config_validation() {
        assert!(valid().validate().is_ok());

        // Host is required
        assert!(matches!(
            AppConfig::default().validate(),
            Err(ConfigError::Invalid(_))
        ));

        let mut config = valid();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.board.port = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.board.http_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_driver_config() {
        let mut config = valid();
        config.board.max_reconnect_attempts = 2;
        config.board.mock = true;

        let driver = config.board.driver_config();
        assert_eq!(driver.connection.host, "rp-f01234.local");
        assert_eq!(driver.connection.max_reconnect_attempts, 2);
        assert!(driver.mock);
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = AppConfig::figment(Some(Path::new("/nonexistent/pitaya.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_cli_style_override() {
        let figment = Figment::new()
            .merge(Serialized::default("board.host", "10.0.0.7"))
            .merge(Serialized::default("board.port", 5000));
        let config = AppConfig::extract(figment).unwrap();
        assert_eq!(config.board.host, "10.0.0.7");
        assert_eq!(config.board.port, 5000);
    }
}
