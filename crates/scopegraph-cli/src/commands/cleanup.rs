//! Cleanup command - Remove orphan incident scenarios of a scope
//!
//! An incident scenario without any linked asset is an orphan. It is removed
//! together with the controls and vulnerabilities linked to it.

use anyhow::{Context, Result};
use clap::Args;
use scopegraph_core::{
    Cleaner, CleanupReport, CommandService, GraphBuilder, GraphCommand, RecordingCommandService,
    ScopeId,
};

use super::{cleanup_schema, open_store, print_info};
use crate::progress::{finish_spinner, finish_spinner_warn, spinner};
use crate::GlobalOptions;

/// Arguments for the cleanup command
#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Scope to clean up
    #[arg(long, short = 's')]
    scope: i64,

    /// List what would be removed without changing the store
    #[arg(long, short = 'n')]
    dry_run: bool,

    /// Output the cleanup report as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the cleanup command
pub fn execute(args: CleanupArgs, global: GlobalOptions) -> Result<()> {
    let (config, store) = open_store(&global)?;
    let schema = cleanup_schema(&config.cleanup);
    let scope = ScopeId(args.scope);

    let recorder = RecordingCommandService::new();
    let commands: &dyn CommandService = if args.dry_run { &recorder } else { &store };

    let pb = spinner(
        &format!("Scanning scope {} for orphan scenarios...", scope),
        global.quiet || args.json,
    );
    let builder = GraphBuilder::new(&store);
    let mut cleaner = Cleaner::new(scope, schema, commands);
    let report = cleaner
        .execute(&builder)
        .with_context(|| format!("Cleanup of scope {} failed", scope))?;

    let summary = format!(
        "{} {} elements for {} orphan scenarios ({} scanned)",
        if args.dry_run {
            "Would remove"
        } else {
            "Removed"
        },
        report.removed.len(),
        report.orphans.len(),
        report.scenarios_scanned
    );
    if report.orphans.is_empty() {
        finish_spinner(pb, &format!("No orphan scenarios in scope {}", scope));
    } else if args.dry_run {
        finish_spinner_warn(pb, &summary);
    } else {
        finish_spinner(pb, &summary);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, args.dry_run);
        if args.dry_run && !report.removed.is_empty() {
            print_info("Dry run: store unchanged", global.quiet);
        }
    }

    Ok(())
}

fn print_report(report: &CleanupReport, dry_run: bool) {
    let verb = if dry_run { "would remove" } else { "removed" };
    for removed in &report.removed {
        println!(
            "{} {} #{} '{}' (orphan #{})",
            verb, removed.type_id, removed.element_id, removed.title, removed.orphan
        );
    }
}
