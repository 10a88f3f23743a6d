//! Scopegraph CLI - Element store, graph snapshots and scope cleanup
//!
//! A command-line interface over a SQLite element store: import datasets,
//! inspect elements facet by facet, build filtered graph snapshots and run
//! the orphan scenario cleanup.
//!
//! # Usage
//!
//! ```bash
//! # Create the store in the current workspace
//! scopegraph init
//!
//! # Load elements and links from a JSON dataset
//! scopegraph import risks.json
//!
//! # Show the cleanup graph of scope 7
//! scopegraph graph --scope 7 --type asset --type incident_scenario
//!
//! # Preview, then run, the orphan scenario cleanup
//! scopegraph cleanup --scope 7 --dry-run
//! scopegraph cleanup --scope 7
//! ```

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use scopegraph_config::{ConfigOverrides, LogFormat, LoggingConfig};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

mod commands;
mod progress;

/// Scopegraph - Partially materialized element graphs
#[derive(Parser, Debug)]
#[command(name = "scopegraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Workspace directory (defaults to the current directory)
    #[arg(long, short = 'w', global = true, env = "SCOPEGRAPH_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to an additional configuration file
    #[arg(long, short = 'c', global = true, env = "SCOPEGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Element store database file
    #[arg(long, global = true, env = "SCOPEGRAPH_DATABASE")]
    database: Option<PathBuf>,
}

impl GlobalOptions {
    /// Convert global options to config overrides
    pub fn to_config_overrides(&self) -> ConfigOverrides {
        let log_level = if self.quiet {
            Some("error".to_string())
        } else if self.verbose {
            Some("debug".to_string())
        } else {
            None
        };

        ConfigOverrides {
            database: self.database.clone(),
            log_level,
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the element store and local configuration
    Init(commands::init::InitArgs),

    /// Import elements and links from a JSON dataset
    Import(commands::import::ImportArgs),

    /// Show one element with selected facets
    Element(commands::element::ElementArgs),

    /// Build and print a filtered graph snapshot
    Graph(commands::graph::GraphArgs),

    /// Remove orphan incident scenarios of a scope
    Cleanup(commands::cleanup::CleanupArgs),

    /// Show store location and contents
    Status(commands::status::StatusArgs),

    /// View and manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // A broken config file is reported by the command itself
    let logging = commands::load_config(&cli.global)
        .map(|(_, config)| config.logging)
        .unwrap_or_default();
    let flag_level = cli.global.to_config_overrides().log_level;
    init_tracing(&logging, flag_level.as_deref())?;

    match cli.command {
        Commands::Init(args) => commands::init::execute(args, cli.global),
        Commands::Import(args) => commands::import::execute(args, cli.global),
        Commands::Element(args) => commands::element::execute(args, cli.global),
        Commands::Graph(args) => commands::graph::execute(args, cli.global),
        Commands::Cleanup(args) => commands::cleanup::execute(args, cli.global),
        Commands::Status(args) => commands::status::execute(args, cli.global),
        Commands::Config(cmd) => commands::config::execute(cmd, cli.global),
    }
}

/// Install the tracing subscriber, writing to stderr or `logging.file`.
///
/// Level precedence: `--verbose`/`--quiet`, then `RUST_LOG`, then `logging.level`.
fn init_tracing(logging: &LoggingConfig, flag_level: Option<&str>) -> Result<()> {
    let filter = match flag_level {
        Some(level) => EnvFilter::try_new(level),
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level)),
    }
    .context("Invalid log level")?;

    let (writer, ansi) = match logging.file {
        Some(ref path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
