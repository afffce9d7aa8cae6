//! gatelog CLI
//!
//! Command-line tools for a device-local checkpoint store.
//!
//! # Commands
//!
//! - `inspect` - Display record counts and the sync watermark
//! - `pending` - List records awaiting synchronization
//! - `log` - Record a new checkpoint entry offline
//! - `delete` - Soft-delete an entry

mod commands;

use clap::{Parser, Subcommand};
use gatelog_core::EntryPayload;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// gatelog command-line store tools.
#[derive(Parser)]
#[command(name = "gatelog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
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
    /// Display record counts and the sync watermark
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List records awaiting synchronization, most recent first
    Pending {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Record a new checkpoint entry
    Log {
        /// Checkpoint the entry was made at
        #[arg(long)]
        checkpoint: String,

        /// User making the entry
        #[arg(long)]
        user: String,

        /// Free-text note
        #[arg(long)]
        note: Option<String>,

        #[command(subcommand)]
        entry: EntryArgs,
    },

    /// Soft-delete an entry
    Delete {
        /// Record id (UUID)
        id: String,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum EntryArgs {
    /// A person passing the checkpoint
    Personnel {
        /// Full name
        name: String,

        /// Badge or document number
        #[arg(long)]
        id_number: Option<String>,

        /// Purpose of the visit
        #[arg(long)]
        purpose: Option<String>,
    },

    /// A vehicle passing the checkpoint
    Vehicle {
        /// Licence plate
        plate: String,

        /// Driver name
        #[arg(long)]
        driver: Option<String>,

        /// Kind of vehicle
        #[arg(long)]
        kind: Option<String>,
    },

    /// Anything else
    Other {
        /// What happened
        description: String,
    },
}

impl EntryArgs {
    fn into_payload(self, note: Option<String>) -> EntryPayload {
        match self {
            EntryArgs::Personnel {
                name,
                id_number,
                purpose,
            } => EntryPayload::Personnel {
                full_name: name,
                id_number,
                purpose,
                note,
            },
            EntryArgs::Vehicle {
                plate,
                driver,
                kind,
            } => EntryPayload::Vehicle {
                plate_number: plate,
                driver_name: driver,
                vehicle_kind: kind,
                note,
            },
            EntryArgs::Other { description } => EntryPayload::Other { description, note },
        }
    }
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
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format).await?;
        }
        Commands::Pending { format } => {
            let path = cli.path.ok_or("Store path required for pending")?;
            commands::pending::run(&path, &format).await?;
        }
        Commands::Log {
            checkpoint,
            user,
            note,
            entry,
        } => {
            let path = cli.path.ok_or("Store path required for log")?;
            commands::log::run(&path, &checkpoint, &user, entry.into_payload(note)).await?;
        }
        Commands::Delete { id } => {
            let path = cli.path.ok_or("Store path required for delete")?;
            commands::delete::run(&path, &id).await?;
        }
        Commands::Version => {
            println!("gatelog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("gatelog core v{}", gatelog_core::VERSION);
        }
    }

    Ok(())
}
