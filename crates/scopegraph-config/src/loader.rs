//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.scopegraph/config.toml`
//! 2. Local config: `.scopegraph/config.toml` (in workspace)
//! 3. Explicit config file (`--config`), if given
//! 4. CLI overrides
//!
//! Later sources override earlier ones.

use crate::error::ConfigError;
use crate::{
    CleanupConfig, ConfigOverrides, LoggingConfig, ScopegraphConfig, StorageConfig,
    DEFAULT_DATABASE, DEFAULT_DATA_DIR,
};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".scopegraph";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".scopegraph";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.scopegraph`)
    global_config_dir: Option<PathBuf>,

    /// Config file named on the command line
    explicit_config: Option<PathBuf>,

    /// Cached global config
    global_config: Option<ScopegraphConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.scopegraph`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            explicit_config: None,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            explicit_config: None,
            global_config: None,
        }
    }

    /// Merge an explicit config file on top of global and local config.
    ///
    /// Unlike the global and local files, a missing explicit file is an
    /// error ([`ConfigError::MissingConfigFile`]).
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_config = Some(path.into());
        self
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a workspace.
    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a workspace with optional CLI overrides.
    ///
    /// Merges config in order: global → local → explicit file → overrides.
    pub fn load(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<ScopegraphConfig, ConfigError> {
        let mut config = ScopegraphConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(workspace_root)? {
            config = merge_configs(config, local_config);
        }

        if let Some(ref path) = self.explicit_config {
            if !path.exists() {
                return Err(ConfigError::missing_config_file(path));
            }
            debug!("Loading config from {:?}", path);
            config = merge_configs(config, load_config_file(path)?);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<ScopegraphConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;

        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a workspace.
    pub fn load_local(
        &self,
        workspace_root: &Path,
    ) -> Result<Option<ScopegraphConfig>, ConfigError> {
        let local_path = self.local_config_path(workspace_root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Save configuration to the global config file.
    pub fn save_global(&self, config: &ScopegraphConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        save_config_file(&global_dir.join(CONFIG_FILE_NAME), config)
    }

    /// Save configuration to the local config file for a workspace.
    pub fn save_local(
        &self,
        workspace_root: &Path,
        config: &ScopegraphConfig,
    ) -> Result<(), ConfigError> {
        save_config_file(&self.local_config_path(workspace_root), config)
    }

    /// Initialize global configuration directory.
    ///
    /// Creates `~/.scopegraph/config.toml` with default configuration.
    /// An existing file is left untouched.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };
        init_config_dir(global_dir)
    }

    /// Initialize local configuration for a workspace.
    ///
    /// Creates `.scopegraph/config.toml` with default configuration.
    pub fn init_local(&self, workspace_root: &Path) -> Result<PathBuf, ConfigError> {
        init_config_dir(&workspace_root.join(LOCAL_CONFIG_DIR))
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load_global()` call.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

fn init_config_dir(dir: &Path) -> Result<PathBuf, ConfigError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::create_dir(dir, e))?;
    }

    let config_path = dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        save_config_file(&config_path, &ScopegraphConfig::default())?;
    }

    Ok(config_path)
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<ScopegraphConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &ScopegraphConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// Fields still at their default value in `overlay` keep the base value,
/// which lets partial files stack.
fn merge_configs(base: ScopegraphConfig, overlay: ScopegraphConfig) -> ScopegraphConfig {
    ScopegraphConfig {
        storage: merge_storage(base.storage, overlay.storage),
        cleanup: merge_cleanup(base.cleanup, overlay.cleanup),
        logging: merge_logging(base.logging, overlay.logging),
    }
}

fn merge_storage(base: StorageConfig, overlay: StorageConfig) -> StorageConfig {
    StorageConfig {
        data_dir: if overlay.data_dir != Path::new(DEFAULT_DATA_DIR) {
            overlay.data_dir
        } else {
            base.data_dir
        },
        database: if overlay.database != Path::new(DEFAULT_DATABASE) {
            overlay.database
        } else {
            base.database
        },
    }
}

fn merge_cleanup(base: CleanupConfig, overlay: CleanupConfig) -> CleanupConfig {
    let defaults = CleanupConfig::default();
    let pick = |base: String, overlay: String, default: &str| {
        if overlay != default {
            overlay
        } else {
            base
        }
    };

    CleanupConfig {
        asset_type: pick(base.asset_type, overlay.asset_type, &defaults.asset_type),
        scenario_type: pick(
            base.scenario_type,
            overlay.scenario_type,
            &defaults.scenario_type,
        ),
        control_type: pick(
            base.control_type,
            overlay.control_type,
            &defaults.control_type,
        ),
        vulnerability_type: pick(
            base.vulnerability_type,
            overlay.vulnerability_type,
            &defaults.vulnerability_type,
        ),
        scenario_asset_relation: pick(
            base.scenario_asset_relation,
            overlay.scenario_asset_relation,
            &defaults.scenario_asset_relation,
        ),
        scenario_vulnerability_relation: pick(
            base.scenario_vulnerability_relation,
            overlay.scenario_vulnerability_relation,
            &defaults.scenario_vulnerability_relation,
        ),
        control_scenario_relation: pick(
            base.control_scenario_relation,
            overlay.control_scenario_relation,
            &defaults.control_scenario_relation,
        ),
    }
}

fn merge_logging(base: LoggingConfig, overlay: LoggingConfig) -> LoggingConfig {
    LoggingConfig {
        level: if overlay.level != "info" {
            overlay.level
        } else {
            base.level
        },
        format: if overlay.format != crate::LogFormat::Text {
            overlay.format
        } else {
            base.format
        },
        file: overlay.file.or(base.file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogFormat;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn create_test_config(content: &str, dir: &Path) -> PathBuf {
        let config_dir = dir.join(".scopegraph");
        std::fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn write_global(global_dir: &Path, content: &str) {
        std::fs::create_dir_all(global_dir).unwrap();
        std::fs::write(global_dir.join("config.toml"), content).unwrap();
    }

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config, ScopegraphConfig::default());
    }

    #[test]
    fn test_load_local_config() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        create_test_config(
            r#"
            [storage]
            database = "risk.db"

            [cleanup]
            scenario_type = "risk_scenario"
            "#,
            temp.path(),
        );

        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.storage.database, PathBuf::from("risk.db"));
        assert_eq!(config.cleanup.scenario_type, "risk_scenario");
        assert_eq!(config.cleanup.control_type, "control");
    }

    #[test]
    fn test_local_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");

        write_global(
            &global_dir,
            r#"
            [logging]
            level = "debug"

            [cleanup]
            control_type = "global_control"
            asset_type = "global_asset"
            "#,
        );

        create_test_config(
            r#"
            [cleanup]
            control_type = "local_control"
            "#,
            temp.path(),
        );

        let mut loader = ConfigLoader::with_global_dir(&global_dir);
        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.cleanup.control_type, "local_control");
        // Not overridden locally
        assert_eq!(config.cleanup.asset_type, "global_asset");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_explicit_file_and_cli_overrides() {
        let temp = TempDir::new().unwrap();
        create_test_config(
            r#"
            [logging]
            level = "warn"
            "#,
            temp.path(),
        );
        let explicit = temp.path().join("ci.toml");
        std::fs::write(
            &explicit,
            r#"
            [logging]
            format = "json"
            level = "error"
            "#,
        )
        .unwrap();

        let mut loader =
            ConfigLoader::with_global_dir(temp.path().join("global")).with_config_file(&explicit);
        let overrides = ConfigOverrides {
            log_level: Some("trace".to_string()),
            ..Default::default()
        };
        let config = loader.load(temp.path(), Some(&overrides)).unwrap();

        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"))
            .with_config_file(temp.path().join("absent.toml"));

        let err = loader.load(temp.path(), None).unwrap_err();
        match err {
            ConfigError::MissingConfigFile { path } => {
                assert_eq!(path, temp.path().join("absent.toml"))
            }
            other => panic!("expected MissingConfigFile, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_global_and_local_files_are_skipped() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("nowhere"));

        assert!(loader.load_global().unwrap().is_none());
        assert!(loader.load_local(temp.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_merged_config_is_rejected() {
        let temp = TempDir::new().unwrap();
        create_test_config(
            r#"
            [cleanup]
            control_type = "asset"
            "#,
            temp.path(),
        );

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let err = loader.load(temp.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_malformed_toml_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = create_test_config("[cleanup\nasset_type = 1", temp.path());

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let err = loader.load(temp.path(), None).unwrap_err();
        assert!(err.to_string().contains(&path.display().to_string()));
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let mut config = ScopegraphConfig::default();
        config.cleanup.vulnerability_type = "weakness".to_string();
        config.logging.level = "warn".to_string();

        loader.save_local(temp.path(), &config).unwrap();

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let loaded = loader.load(temp.path(), None).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_init_local_creates_config() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let config_path = loader.init_local(temp.path()).unwrap();

        assert!(config_path.exists());
        assert!(config_path.ends_with(".scopegraph/config.toml"));

        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: ScopegraphConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed, ScopegraphConfig::default());
    }

    #[test]
    fn test_init_keeps_existing_file() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");
        write_global(&global_dir, "[logging]\nlevel = \"debug\"\n");

        let loader = ConfigLoader::with_global_dir(&global_dir);
        let path = loader.init_global().unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "[logging]\nlevel = \"debug\"\n");
    }

    #[test]
    fn test_cleanup_merge_keeps_base_for_defaults() {
        let base = CleanupConfig {
            scenario_type: "risk_scenario".to_string(),
            ..Default::default()
        };
        let overlay = CleanupConfig {
            control_scenario_relation: "mitigates".to_string(),
            ..Default::default()
        };

        let merged = merge_cleanup(base, overlay);

        assert_eq!(merged.scenario_type, "risk_scenario");
        assert_eq!(merged.control_scenario_relation, "mitigates");
        assert_eq!(merged.asset_type, "asset");
    }

    #[test]
    fn test_cache_clearing() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");
        write_global(&global_dir, "[logging]\nlevel = \"debug\"\n");

        let mut loader = ConfigLoader::with_global_dir(&global_dir);

        let _ = loader.load_global().unwrap();
        assert!(loader.global_config.is_some());

        loader.clear_cache();
        assert!(loader.global_config.is_none());
    }
}
