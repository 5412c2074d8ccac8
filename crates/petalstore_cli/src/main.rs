//! PetalStore CLI
//!
//! Command-line tools for PetalStore databases kept in a directory.
//!
//! # Commands
//!
//! - `inspect` - Display version, collections and record counts
//! - `upgrade` - Apply the shop migration plan
//! - `dump` - Print a collection's records as JSON lines
//! - `verify` - Check every log record envelope and checksum

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PetalStore command-line database tools.
#[derive(Parser)]
#[command(name = "petalstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Database name
    #[arg(global = true, short, long, default_value = petalstore_core::shop::DATABASE_NAME)]
    name: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display version, collections, indexes and record counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Apply pending steps of the shop migration plan
    Upgrade {
        /// Stop at this version instead of the plan's last step
        #[arg(short, long)]
        to: Option<u64>,

        /// Dry run - show what would be applied
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Print the records of a collection as JSON lines
    Dump {
        /// Collection to dump
        #[arg(short, long)]
        collection: String,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Verify log integrity
    Verify,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, &cli.name, &format)?;
        }
        Commands::Upgrade { to, dry_run } => {
            let path = cli.path.ok_or("Database path required for upgrade")?;
            commands::upgrade::run(&path, &cli.name, to, dry_run).await?;
        }
        Commands::Dump { collection, limit } => {
            let path = cli.path.ok_or("Database path required for dump")?;
            commands::dump::run(&path, &cli.name, &collection, limit)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path, &cli.name)?;
        }
        Commands::Version => {
            println!("PetalStore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("PetalStore Core v{}", petalstore_core::VERSION);
        }
    }

    Ok(())
}
