//! CLI command implementations
//!
//! Shared helpers for workspace resolution, config loading and store access.

pub mod cleanup;
pub mod config;
pub mod element;
pub mod graph;
pub mod import;
pub mod init;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use scopegraph_config::{CleanupConfig, ConfigLoader, ScopegraphConfig};
use scopegraph_core::{CleanupSchema, SqliteStore};

use crate::GlobalOptions;

/// Resolve the workspace path from options or current directory.
pub fn resolve_workspace(global: &GlobalOptions) -> Result<PathBuf> {
    match global.workspace {
        Some(ref path) => path
            .canonicalize()
            .with_context(|| format!("Workspace not found: {}", path.display())),
        None => std::env::current_dir().context("Failed to get current directory"),
    }
}

/// Build a config loader honoring `--config`.
pub fn config_loader(global: &GlobalOptions) -> ConfigLoader {
    let loader = ConfigLoader::new();
    match global.config {
        Some(ref path) => loader.with_config_file(path),
        None => loader,
    }
}

/// Resolve the workspace and load its merged configuration.
pub fn load_config(global: &GlobalOptions) -> Result<(PathBuf, ScopegraphConfig)> {
    let workspace = resolve_workspace(global)?;
    let config = config_loader(global)
        .load(&workspace, Some(&global.to_config_overrides()))
        .context("Failed to load configuration")?;
    Ok((workspace, config))
}

/// Open the workspace's existing element store.
pub fn open_store(global: &GlobalOptions) -> Result<(ScopegraphConfig, SqliteStore)> {
    let (workspace, config) = load_config(global)?;
    let db_path = config.database_path(&workspace);

    if !db_path.exists() {
        anyhow::bail!(
            "No element store at {}. Run `scopegraph init` first.",
            db_path.display()
        );
    }

    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open element store {}", db_path.display()))?;
    Ok((config, store))
}

/// Translate configured cleanup ids into the core schema.
pub fn cleanup_schema(config: &CleanupConfig) -> CleanupSchema {
    CleanupSchema {
        asset_type: config.asset_type.as_str().into(),
        scenario_type: config.scenario_type.as_str().into(),
        control_type: config.control_type.as_str().into(),
        vulnerability_type: config.vulnerability_type.as_str().into(),
        scenario_asset: config.scenario_asset_relation.as_str().into(),
        scenario_vulnerability: config.scenario_vulnerability_relation.as_str().into(),
        control_scenario: config.control_scenario_relation.as_str().into(),
    }
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}

/// Display a path relative to the workspace when possible.
pub fn display_path(path: &Path, workspace: &Path) -> String {
    path.strip_prefix(workspace)
        .unwrap_or(path)
        .display()
        .to_string()
}
