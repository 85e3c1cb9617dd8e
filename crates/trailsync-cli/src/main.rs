//! trailsync - administration CLI
//!
//! Migrates the schema, provisions accounts and maintains quota counters of a
//! trailsync database, local or remote.

mod cli;
mod commands;
mod error;


use clap::Parser;
use trailsync_core::EngineConfig;

use crate::cli::{AccountCommands, Cli, Commands, QuotaCommands};
use crate::commands::account::run_account_create;
use crate::commands::common::{open_database, resolve_target};
use crate::commands::migrate::run_migrate;
use crate::commands::quota::{run_quota_reconcile, run_quota_set_max, run_quota_show};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "trailsync=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let target = resolve_target(cli.db, cli.database_url)?;
    let db = open_database(&target).await?;

    let output = match cli.command {
        Commands::Migrate => run_migrate(&db).await?,
        Commands::Account {
            command: AccountCommands::Create { owner },
        } => {
            let config = EngineConfig::from_env()?;
            run_account_create(&db, &config, &owner).await?
        }
        Commands::Quota { command } => match command {
            QuotaCommands::Show { owner, json } => run_quota_show(&db, &owner, json).await?,
            QuotaCommands::SetMax { owner, kind, max } => {
                run_quota_set_max(&db, &owner, kind, max).await?
            }
            QuotaCommands::Reconcile => run_quota_reconcile(&db).await?,
        },
    };

    println!("{output}");
    Ok(())
}
