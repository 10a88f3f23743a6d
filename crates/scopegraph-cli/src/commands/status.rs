//! Status command - Show store location and contents

use anyhow::Result;
use clap::Args;
use scopegraph_core::{SqliteStore, StoreCounts, STORE_SCHEMA_VERSION};
use serde::Serialize;

use super::load_config;
use crate::GlobalOptions;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show configuration details
    #[arg(long = "show-config")]
    show_config: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Status {
    workspace_path: std::path::PathBuf,
    database: std::path::PathBuf,
    initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    counts: Option<StoreCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<scopegraph_config::ScopegraphConfig>,
}

/// Execute the status command
pub fn execute(args: StatusArgs, global: GlobalOptions) -> Result<()> {
    let (workspace_path, config) = load_config(&global)?;
    let database = config.database_path(&workspace_path);
    let initialized = database.exists();

    let mut status = Status {
        workspace_path,
        database,
        initialized,
        schema_version: None,
        counts: None,
        error: None,
        config: args.show_config.then(|| config.clone()),
    };

    if initialized {
        // Report store problems instead of failing the whole command
        match SqliteStore::open(&status.database) {
            Ok(store) => {
                status.schema_version = store.get_metadata("schema_version").ok().flatten();
                match store.counts() {
                    Ok(counts) => status.counts = Some(counts),
                    Err(e) => status.error = Some(e.to_string()),
                }
            }
            Err(e) => status.error = Some(e.to_string()),
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Scopegraph Status");
    println!("=================\n");
    println!("Workspace: {}", status.workspace_path.display());
    println!("Store:     {}", status.database.display());

    if !status.initialized {
        println!("\nNot initialized. Run `scopegraph init` to create the store.");
        return Ok(());
    }

    println!(
        "Schema:    {} (expected {})",
        status.schema_version.as_deref().unwrap_or("unknown"),
        STORE_SCHEMA_VERSION
    );

    if let Some(ref counts) = status.counts {
        println!("\nContents:");
        println!("  Elements:    {}", counts.elements);
        println!("  Properties:  {}", counts.properties);
        println!("  Links:       {}", counts.links);
        println!("  Permissions: {}", counts.permissions);
    }
    if let Some(ref error) = status.error {
        println!("\nStore error: {}", error);
    }

    if args.show_config {
        println!("\nConfiguration:");
        println!("  Log level:        {}", config.logging.level);
        println!("  Scenario type:    {}", config.cleanup.scenario_type);
        println!(
            "  Asset relation:   {}",
            config.cleanup.scenario_asset_relation
        );
        println!(
            "  Control relation: {}",
            config.cleanup.control_scenario_relation
        );
    }

    Ok(())
}
