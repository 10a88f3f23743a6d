//! Import command - Load a JSON dataset into the element store

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use scopegraph_core::Dataset;

use super::{open_store, print_info};
use crate::progress::{finish_spinner, spinner};
use crate::GlobalOptions;

/// Arguments for the import command
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Dataset file (JSON with `elements` and `links`)
    file: PathBuf,

    /// Print the resulting store counts as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the import command
pub fn execute(args: ImportArgs, global: GlobalOptions) -> Result<()> {
    let (_, store) = open_store(&global)?;

    let dataset = Dataset::load(&args.file)
        .with_context(|| format!("Failed to read dataset {}", args.file.display()))?;

    let pb = spinner(
        &format!(
            "Importing {} elements and {} links...",
            dataset.elements.len(),
            dataset.links.len()
        ),
        global.quiet || args.json,
    );
    let counts = store
        .import_dataset(&dataset)
        .context("Failed to import dataset")?;
    finish_spinner(
        pb,
        &format!(
            "Imported {} elements and {} links",
            dataset.elements.len(),
            dataset.links.len()
        ),
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        print_info(
            &format!(
                "Store now holds {} elements, {} properties, {} links, {} permissions",
                counts.elements, counts.properties, counts.links, counts.permissions
            ),
            global.quiet,
        );
    }

    Ok(())
}
