//! Scopegraph Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.scopegraph/config.toml`
//! - Local config: `.scopegraph/config.toml` (in workspace)
//! - An explicit file passed with `--config`
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → explicit file → CLI
//! overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default data directory, relative to the workspace root
pub const DEFAULT_DATA_DIR: &str = ".scopegraph";

/// Default database file name inside the data directory
pub const DEFAULT_DATABASE: &str = "store.db";

/// Root configuration for scopegraph.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ScopegraphConfig {
    /// Storage configuration
    pub storage: StorageConfig,

    /// Orphan cleanup type and relation ids
    pub cleanup: CleanupConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Element store location.
///
/// # Example TOML
///
/// ```toml
/// [storage]
/// data_dir = ".scopegraph"
/// database = "store.db"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory (relative paths resolve against the workspace root)
    pub data_dir: PathBuf,

    /// Database file (relative paths resolve against `data_dir`)
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            database: PathBuf::from(DEFAULT_DATABASE),
        }
    }
}

/// Type and relation ids used by the orphan scenario cleanup.
///
/// # Example TOML
///
/// ```toml
/// [cleanup]
/// scenario_type = "incident_scenario"
/// control_scenario_relation = "rel_control_incscen"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CleanupConfig {
    pub asset_type: String,
    pub scenario_type: String,
    pub control_type: String,
    pub vulnerability_type: String,

    /// scenario → asset
    pub scenario_asset_relation: String,
    /// scenario → vulnerability
    pub scenario_vulnerability_relation: String,
    /// control → scenario
    pub control_scenario_relation: String,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            asset_type: "asset".to_string(),
            scenario_type: "incident_scenario".to_string(),
            control_type: "control".to_string(),
            vulnerability_type: "vulnerability".to_string(),
            scenario_asset_relation: "rel_incscen_asset".to_string(),
            scenario_vulnerability_relation: "rel_incscen_vulnerability".to_string(),
            control_scenario_relation: "rel_control_incscen".to_string(),
        }
    }
}

impl CleanupConfig {
    /// Validate that ids are present and distinct.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let types = [
            ("cleanup.asset_type", &self.asset_type),
            ("cleanup.scenario_type", &self.scenario_type),
            ("cleanup.control_type", &self.control_type),
            ("cleanup.vulnerability_type", &self.vulnerability_type),
        ];
        let relations = [
            (
                "cleanup.scenario_asset_relation",
                &self.scenario_asset_relation,
            ),
            (
                "cleanup.scenario_vulnerability_relation",
                &self.scenario_vulnerability_relation,
            ),
            (
                "cleanup.control_scenario_relation",
                &self.control_scenario_relation,
            ),
        ];

        for group in [&types[..], &relations[..]] {
            let mut seen = HashSet::new();
            for (key, value) in group {
                if value.trim().is_empty() {
                    return Err(ConfigError::invalid_value(*key, "must not be empty"));
                }
                if !seen.insert(value.as_str()) {
                    let message = format!("'{value}' is used twice");
                    return Err(ConfigError::invalid_value(*key, message));
                }
            }
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,

    /// Log file path (optional)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::invalid_value(
                "logging.format",
                format!("unknown format '{}'. Valid values: text, json", s),
            )),
        }
    }
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override data directory
    pub data_dir: Option<PathBuf>,

    /// Override database file
    pub database: Option<PathBuf>,

    /// Override log level
    pub log_level: Option<String>,

    /// Override log format
    pub log_format: Option<LogFormat>,
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl ScopegraphConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref dir) = overrides.data_dir {
            self.storage.data_dir = dir.clone();
        }

        if let Some(ref database) = overrides.database {
            self.storage.database = database.clone();
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }

        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.database.as_os_str().is_empty() {
            return Err(ConfigError::invalid_value("storage.database", "must not be empty"));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "logging.level",
                format!(
                    "unknown level '{}'. Valid values: {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            ));
        }
        self.cleanup.validate()
    }

    /// Render as TOML, in the format config files are written in.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the effective data directory for a workspace.
    pub fn data_dir(&self, workspace_root: &Path) -> PathBuf {
        if self.storage.data_dir.is_absolute() {
            self.storage.data_dir.clone()
        } else {
            workspace_root.join(&self.storage.data_dir)
        }
    }

    /// Get the database file path for a workspace.
    pub fn database_path(&self, workspace_root: &Path) -> PathBuf {
        if self.storage.database.is_absolute() {
            self.storage.database.clone()
        } else {
            self.data_dir(workspace_root).join(&self.storage.database)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = ScopegraphConfig::default();
        assert_eq!(config.storage.data_dir, PathBuf::from(".scopegraph"));
        assert_eq!(config.storage.database, PathBuf::from("store.db"));
        assert_eq!(config.cleanup.scenario_type, "incident_scenario");
        assert_eq!(
            config.cleanup.control_scenario_relation,
            "rel_control_incscen"
        );
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = ScopegraphConfig::default();
        let overrides = ConfigOverrides {
            database: Some(PathBuf::from("/tmp/other.db")),
            log_level: Some("debug".to_string()),
            log_format: Some(LogFormat::Json),
            ..Default::default()
        };

        config.apply_overrides(&overrides);

        assert_eq!(config.storage.database, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_database_path_resolution() {
        let mut config = ScopegraphConfig::default();
        let workspace = PathBuf::from("/home/user/isms");

        assert_eq!(
            config.database_path(&workspace),
            PathBuf::from("/home/user/isms/.scopegraph/store.db")
        );

        config.storage.data_dir = PathBuf::from("/var/lib/scopegraph");
        assert_eq!(
            config.database_path(&workspace),
            PathBuf::from("/var/lib/scopegraph/store.db")
        );

        config.storage.database = PathBuf::from("/srv/risk.db");
        assert_eq!(
            config.database_path(&workspace),
            PathBuf::from("/srv/risk.db")
        );
    }

    #[test]
    fn test_validate_rejects_empty_and_duplicate_ids() {
        let mut config = ScopegraphConfig::default();
        config.cleanup.control_type = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cleanup.control_type"));

        let mut config = ScopegraphConfig::default();
        config.cleanup.vulnerability_type = "asset".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("used twice"));

        // The same string may be a type and a relation
        let mut config = ScopegraphConfig::default();
        config.cleanup.scenario_asset_relation = "asset".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = ScopegraphConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "WARN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::Text.to_string(), "text");
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_toml_string_parses_back() {
        let mut config = ScopegraphConfig::default();
        config.logging.format = LogFormat::Json;

        let text = config.to_toml_string().unwrap();
        assert!(text.contains("[cleanup]"));
        let parsed: ScopegraphConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ScopegraphConfig = toml::from_str(
            r#"
            [cleanup]
            scenario_type = "risk_scenario"
            "#,
        )
        .unwrap();
        assert_eq!(config.cleanup.scenario_type, "risk_scenario");
        assert_eq!(config.cleanup.asset_type, "asset");
        assert_eq!(config.storage, StorageConfig::default());
    }
}
