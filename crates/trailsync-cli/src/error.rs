use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] trailsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] trailsync_core::ConfigError),
    #[error("Account identifier cannot be empty")]
    EmptyOwner,
    #[error("No quota counters for {0}. Run `trailsync account create {0}` first.")]
    UnknownAccount(String),
}
