//! RelStore CLI
//!
//! Command-line tools for RelStore log files.
//!
//! # Commands
//!
//! - `inspect` - Display frame, record and type counts
//! - `get` - Print one record
//! - `query` - Print the records of a type matching field equalities
//! - `compact` - Rewrite the log with only live records

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// RelStore command-line store tools.
#[derive(Parser)]
#[command(name = "relstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store's log file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print one record as JSON
    Get {
        /// Type tag of the record
        #[arg(short = 't', long = "type")]
        type_tag: String,

        /// Primary id; integers are read as integer ids
        #[arg(short, long)]
        id: String,
    },

    /// Print the records of a type whose fields equal the given values
    Query {
        /// Type tag to scan
        #[arg(short = 't', long = "type")]
        type_tag: String,

        /// Conditions as `field=value`; values are JSON literals or plain text
        conditions: Vec<String>,
    },

    /// Rewrite the log keeping only live records
    Compact {
        /// Show what would be done without rewriting
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Get { type_tag, id } => {
            let path = cli.path.ok_or("Store path required for get")?;
            runtime.block_on(commands::get::run(&path, &type_tag, &id))?;
        }
        Commands::Query {
            type_tag,
            conditions,
        } => {
            let path = cli.path.ok_or("Store path required for query")?;
            runtime.block_on(commands::query::run(&path, &type_tag, &conditions))?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Store path required for compact")?;
            runtime.block_on(commands::compact::run(&path, dry_run))?;
        }
        Commands::Version => {
            println!("RelStore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("RelStore Core v{}", relstore_core::VERSION);
        }
    }

    Ok(())
}
