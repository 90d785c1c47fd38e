//! Configuration management for record-export
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments (applied by the binary)
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::utils::{fs::expand_home, time::parse_duration};

/// Prefix of every environment variable read by [`Config::from_env`]
pub const ENV_PREFIX: &str = "RECORD_EXPORT_";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Export engine configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Artifact storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Export engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Records fetched per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Generate artifacts after the export record is created instead of before
    #[serde(default)]
    pub generate_in_background: bool,

    /// Delete old export records whenever a new one is created
    #[serde(default = "default_auto_delete")]
    pub auto_delete: bool,

    /// Age in seconds after which export records are deleted
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

/// Artifact storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the local artifact storage
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_page_size() -> usize {
    1000
}

fn default_auto_delete() -> bool {
    true
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_storage_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("record-export")
        .join("storage")
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            generate_in_background: false,
            auto_delete: default_auto_delete(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFormat(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Load configuration from multiple sources with proper precedence
    ///
    /// Reads the default config file when it exists, then applies
    /// environment overrides and validates the result.
    ///
    /// # Returns
    /// * `Result<Config>` - Merged configuration or error
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`Config::load`], reading `path` instead of the default file
    ///
    /// An explicit path must exist; the default path is optional.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        let mut config = file;
        config.apply_vars(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables are prefixed with RECORD_EXPORT_
    /// Example: RECORD_EXPORT_PAGE_SIZE=500
    ///
    /// # Returns
    /// * `Result<Config>` - Configuration from environment or default
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build a configuration from a variable lookup, starting from defaults
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_vars(lookup)?;
        Ok(config)
    }

    /// Overwrite every field whose variable is set, whatever its value
    ///
    /// Unset variables leave the field untouched, so a variable can put a
    /// file value back to its default.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            let name = format!("{ENV_PREFIX}{key}");
            lookup(&name).map(|value| (name, value))
        };
        let config = self;

        if let Some((name, value)) = var("PAGE_SIZE") {
            config.export.page_size = parse_var(&name, &value)?;
        }
        if let Some((name, value)) = var("GENERATE_IN_BACKGROUND") {
            config.export.generate_in_background = parse_bool(&name, &value)?;
        }
        if let Some((name, value)) = var("AUTO_DELETE") {
            config.export.auto_delete = parse_bool(&name, &value)?;
        }
        if let Some((name, value)) = var("RETENTION_SECS") {
            config.export.retention_secs = parse_duration(&value)
                .map(|d| d.as_secs())
                .ok_or_else(|| invalid_value(&name, &value))?;
        }
        if let Some((_, value)) = var("STORAGE_ROOT") {
            config.storage.root = expand_home(&value);
        }
        if let Some((name, value)) = var("LOG_LEVEL") {
            config.logging.level = parse_var(&name, &value)?;
        }
        if let Some((name, value)) = var("LOG_TIMESTAMPS") {
            config.logging.timestamps = parse_bool(&name, &value)?;
        }

        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("record-export")
            .join("config.toml")
    }

    /// Save configuration to a file
    ///
    /// # Arguments
    /// * `path` - Path where to save the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Success or error
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Merge this configuration with another, giving priority to the other
    ///
    /// A value of `other` wins when it differs from the default; values
    /// left at their default keep what `self` has.
    ///
    /// # Arguments
    /// * `other` - Configuration to merge with (takes precedence)
    ///
    /// # Returns
    /// * `Config` - Merged configuration
    pub fn merge(&self, other: &Config) -> Config {
        fn pick<T: Clone + PartialEq>(base: &T, over: &T, default: &T) -> T {
            if over != default { over.clone() } else { base.clone() }
        }

        let export = ExportConfig::default();
        let storage = StorageConfig::default();
        let logging = LoggingConfig::default();

        Config {
            export: ExportConfig {
                page_size: pick(&self.export.page_size, &other.export.page_size, &export.page_size),
                generate_in_background: pick(
                    &self.export.generate_in_background,
                    &other.export.generate_in_background,
                    &export.generate_in_background,
                ),
                auto_delete: pick(&self.export.auto_delete, &other.export.auto_delete, &export.auto_delete),
                retention_secs: pick(
                    &self.export.retention_secs,
                    &other.export.retention_secs,
                    &export.retention_secs,
                ),
            },
            storage: StorageConfig {
                root: pick(&self.storage.root, &other.storage.root, &storage.root),
            },
            logging: LoggingConfig {
                level: pick(&self.logging.level, &other.logging.level, &logging.level),
                timestamps: pick(&self.logging.timestamps, &other.logging.timestamps, &logging.timestamps),
            },
        }
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.export.page_size == 0 {
            return Err(invalid_value("export.page_size", "0").into());
        }
        if self.export.auto_delete && self.export.retention_secs == 0 {
            return Err(invalid_value("export.retention_secs", "0").into());
        }
        if self.storage.root.as_os_str().is_empty() {
            return Err(invalid_value("storage.root", "").into());
        }
        Ok(())
    }

    /// Get the retention window as Duration
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.export.retention_secs)
    }
}

fn invalid_value(field: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid_value(name, value).into())
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid_value(name, value).into()),
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(invalid_value("logging.level", s)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.export.page_size, 1000);
        assert!(!config.export.generate_in_background);
        assert!(config.export.auto_delete);
        assert_eq!(config.retention(), Duration::from_secs(3600));
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[export]\npage_size = 250\ngenerate_in_background = true\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.export.page_size, 250);
        assert!(config.export.generate_in_background);
        assert_eq!(config.export.retention_secs, 3600);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_from_file_errors() {
        assert!(matches!(
            Config::from_file("/definitely/not/here.toml"),
            Err(crate::error::ExportError::Config(ConfigError::FileNotFound(_)))
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[export\npage_size = ").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(crate::error::ExportError::Config(ConfigError::InvalidFormat(_)))
        ));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.export.page_size = 42;
        config.logging.level = LogLevel::Debug;
        config.save(&path).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_from_vars() {
        let config = Config::from_vars(vars(&[
            ("RECORD_EXPORT_PAGE_SIZE", "500"),
            ("RECORD_EXPORT_GENERATE_IN_BACKGROUND", "yes"),
            ("RECORD_EXPORT_RETENTION_SECS", "2h"),
            ("RECORD_EXPORT_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.export.page_size, 500);
        assert!(config.export.generate_in_background);
        assert_eq!(config.export.retention_secs, 7200);
        assert_eq!(config.logging.level, LogLevel::Debug);

        assert!(Config::from_vars(vars(&[("RECORD_EXPORT_PAGE_SIZE", "lots")])).is_err());
        assert!(Config::from_vars(vars(&[("RECORD_EXPORT_AUTO_DELETE", "maybe")])).is_err());
    }

    #[test]
    fn test_vars_override_file_values_back_to_default() {
        let mut config = Config::default();
        config.export.generate_in_background = true;
        config.export.page_size = 250;
        config.logging.timestamps = false;

        config
            .apply_vars(vars(&[
                ("RECORD_EXPORT_GENERATE_IN_BACKGROUND", "false"),
                ("RECORD_EXPORT_PAGE_SIZE", "1000"),
            ]))
            .unwrap();

        assert!(!config.export.generate_in_background);
        assert_eq!(config.export.page_size, 1000);
        assert!(!config.logging.timestamps);

        let before = config.clone();
        assert!(config.apply_vars(vars(&[("RECORD_EXPORT_LOG_TIMESTAMPS", "sometimes")])).is_err());
        assert_eq!(config, before);
    }

    #[test]
    fn test_merge_prefers_non_default_values() {
        let mut file = Config::default();
        file.export.page_size = 250;
        file.logging.level = LogLevel::Info;

        let mut env = Config::default();
        env.logging.level = LogLevel::Trace;

        let merged = file.merge(&env);
        assert_eq!(merged.export.page_size, 250);
        assert_eq!(merged.logging.level, LogLevel::Trace);
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.export.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.export.retention_secs = 0;
        assert!(config.validate().is_err());
        config.export.auto_delete = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
