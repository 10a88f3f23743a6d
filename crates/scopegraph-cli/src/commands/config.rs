//! Config command - View and manage configuration
//!
//! - Show the effective configuration with value sources
//! - Show configuration file paths
//! - Create a default config file (local or global)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use scopegraph_config::ScopegraphConfig;
use serde::Serialize;

use super::{config_loader, load_config, resolve_workspace};
use crate::GlobalOptions;

/// Config management commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show(ShowArgs),

    /// Show configuration file paths
    Path(PathArgs),

    /// Write a default configuration file
    Init(InitArgs),
}

/// Arguments for the show command
#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Print the effective configuration as TOML
    #[arg(long, conflicts_with = "json")]
    toml: bool,
}

/// Arguments for the path command
#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the init command
#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Create ~/.scopegraph/config.toml instead of the workspace config
    #[arg(long)]
    global: bool,
}

/// Configuration value with source information
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue {
    /// Configuration key
    pub key: String,
    /// Current value
    pub value: serde_json::Value,
    /// Source of this value (default, global, local, override)
    pub source: String,
}

/// Configuration paths
#[derive(Debug, Clone, Serialize)]
pub struct ConfigPaths {
    /// Global config file path
    pub global: Option<PathBuf>,
    /// Local config file path
    pub local: PathBuf,
    /// Config file given with --config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explicit: Option<PathBuf>,
    pub global_exists: bool,
    pub local_exists: bool,
}

/// Execute the config command
pub fn execute(cmd: ConfigCommand, global: GlobalOptions) -> Result<()> {
    match cmd {
        ConfigCommand::Show(args) => execute_show(args, global),
        ConfigCommand::Path(args) => execute_path(args, global),
        ConfigCommand::Init(args) => execute_init(args, global),
    }
}

fn execute_show(args: ShowArgs, global: GlobalOptions) -> Result<()> {
    let (workspace, effective) = load_config(&global)?;
    let mut loader = config_loader(&global);

    let default_config = ScopegraphConfig::default();
    let global_config = loader.load_global()?.unwrap_or_default();
    let local_config = loader.load_local(&workspace)?.unwrap_or_default();

    if args.toml {
        print!("{}", effective.to_toml_string()?);
    } else if args.json {
        let values =
            collect_config_values(&default_config, &global_config, &local_config, &effective)?;
        println!("{}", serde_json::to_string_pretty(&values)?);
    } else {
        let values =
            collect_config_values(&default_config, &global_config, &local_config, &effective)?;
        let mut section = String::new();
        for value in &values {
            let (head, key) = value.key.split_once('.').unwrap_or(("", value.key.as_str()));
            if head != section {
                if !section.is_empty() {
                    println!();
                }
                println!("[{}]", head);
                section = head.to_string();
            }
            let source = if value.source == "default" {
                String::new()
            } else {
                format!(" ({})", value.source)
            };
            println!("  {} = {}{}", key, value.value, source);
        }
    }

    Ok(())
}

fn execute_path(args: PathArgs, global: GlobalOptions) -> Result<()> {
    let workspace = resolve_workspace(&global)?;
    let loader = config_loader(&global);

    let global_path = loader.global_config_path();
    let local_path = loader.local_config_path(&workspace);

    let paths = ConfigPaths {
        global_exists: global_path.as_ref().map(|p| p.exists()).unwrap_or(false),
        local_exists: local_path.exists(),
        global: global_path,
        local: local_path,
        explicit: global.config.clone(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&paths)?);
        return Ok(());
    }

    println!("Configuration Paths");
    println!("===================\n");

    match paths.global {
        Some(ref gp) => {
            let state = exists(paths.global_exists);
            println!("Global: {} ({})", gp.display(), state);
        }
        None => println!("Global: not available (no home directory)"),
    }
    println!(
        "Local:  {} ({})",
        paths.local.display(),
        exists(paths.local_exists)
    );
    if let Some(ref explicit) = paths.explicit {
        println!(
            "File:   {} ({})",
            explicit.display(),
            exists(explicit.exists())
        );
    }

    Ok(())
}

fn execute_init(args: InitArgs, global: GlobalOptions) -> Result<()> {
    let loader = config_loader(&global);
    let path = if args.global {
        loader
            .init_global()
            .context("Failed to create global configuration")?
    } else {
        let workspace = resolve_workspace(&global)?;
        loader
            .init_local(&workspace)
            .context("Failed to create local configuration")?
    };

    println!("{}", path.display());
    Ok(())
}

fn exists(flag: bool) -> &'static str {
    if flag {
        "exists"
    } else {
        "not found"
    }
}

/// Flatten the effective config into keyed values with their source
fn collect_config_values(
    default: &ScopegraphConfig,
    global: &ScopegraphConfig,
    local: &ScopegraphConfig,
    effective: &ScopegraphConfig,
) -> Result<Vec<ConfigValue>> {
    let mut values = Vec::new();
    flatten_config(
        "",
        &serde_json::to_value(effective)?,
        &serde_json::to_value(local)?,
        &serde_json::to_value(global)?,
        &serde_json::to_value(default)?,
        &mut values,
    );
    Ok(values)
}

/// Recursively flatten config into key-value pairs with sources
fn flatten_config(
    prefix: &str,
    effective: &serde_json::Value,
    local: &serde_json::Value,
    global: &serde_json::Value,
    default: &serde_json::Value,
    values: &mut Vec<ConfigValue>,
) {
    use serde_json::Value;

    match effective {
        Value::Object(map) => {
            for (key, value) in map {
                let new_prefix = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_config(
                    &new_prefix,
                    value,
                    local.get(key).unwrap_or(&Value::Null),
                    global.get(key).unwrap_or(&Value::Null),
                    default.get(key).unwrap_or(&Value::Null),
                    values,
                );
            }
        }
        _ => {
            let source = if effective == default {
                "default"
            } else if effective == local && local != default {
                "local"
            } else if effective == global && global != default {
                "global"
            } else {
                "override"
            };

            values.push(ConfigValue {
                key: prefix.to_string(),
                value: effective.clone(),
                source: source.to_string(),
            });
        }
    }
}
