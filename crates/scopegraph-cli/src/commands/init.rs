//! Initialize command - Create the element store of a workspace

use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use scopegraph_core::{SqliteStore, STORE_SCHEMA_VERSION};
use tracing::info;

use super::{config_loader, display_path, load_config, print_info};
use crate::GlobalOptions;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Recreate the store even if one already exists (deletes its contents)
    #[arg(long, short = 'f')]
    force: bool,

    /// Do not write a local .scopegraph/config.toml
    #[arg(long)]
    no_config: bool,
}

/// Execute the init command
pub fn execute(args: InitArgs, global: GlobalOptions) -> Result<()> {
    let (workspace, config) = load_config(&global)?;
    let db_path = config.database_path(&workspace);

    if db_path.exists() {
        if !args.force {
            anyhow::bail!(
                "Element store already exists at {}. Use --force to recreate it.",
                db_path.display()
            );
        }
        info!("Removing existing store at {:?}", db_path);
        remove_if_exists(&db_path)?;
        // WAL sidecars
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = db_path.clone().into_os_string();
            sidecar.push(suffix);
            remove_if_exists(Path::new(&sidecar))?;
        }
    }

    if !args.no_config {
        let config_path = config_loader(&global)
            .init_local(&workspace)
            .context("Failed to write local configuration")?;
        print_info(
            &format!("Config:  {}", display_path(&config_path, &workspace)),
            global.quiet,
        );
    }

    SqliteStore::create(&db_path)
        .with_context(|| format!("Failed to create element store {}", db_path.display()))?;

    print_info(
        &format!(
            "Store:   {} (schema {})",
            display_path(&db_path, &workspace),
            STORE_SCHEMA_VERSION
        ),
        global.quiet,
    );
    print_info("Initialized scopegraph workspace", global.quiet);

    Ok(())
}

/// Remove a file, treating an already missing file as removed
fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
