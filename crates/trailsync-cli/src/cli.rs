use std::path::PathBuf;

use clap::{Parser, Subcommand};
use trailsync_core::models::QuotaKind;

#[derive(Parser)]
#[command(name = "trailsync")]
#[command(about = "Administer a trailsync replication database")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a local database file
    #[arg(long, global = true, value_name = "PATH", conflicts_with = "database_url")]
    pub db: Option<PathBuf>,

    /// Remote libSQL database URL (token from TRAILSYNC_DATABASE_AUTH_TOKEN)
    #[arg(long, global = true, value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Manage accounts
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
    /// Inspect and adjust quota counters
    Quota {
        #[command(subcommand)]
        command: QuotaCommands,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create quota counters and the default collection for an account
    Create {
        /// Account identifier (email)
        owner: String,
    },
}

#[derive(Subcommand)]
pub enum QuotaCommands {
    /// Show an account's counters
    Show {
        /// Account identifier (email)
        owner: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change the ceiling of one counter
    SetMax {
        /// Account identifier (email)
        owner: String,
        /// Quota kind, e.g. `trails` or `track_bytes`
        kind: QuotaKind,
        /// New ceiling
        max: i64,
    },
    /// Recompute every counter's usage from stored records
    Reconcile,
}
