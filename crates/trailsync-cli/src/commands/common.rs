use std::env;
use std::path::PathBuf;

use trailsync_core::config::required_trimmed;
use trailsync_core::util::normalize_owner;
use trailsync_core::Database;

use crate::error::CliError;

const DEFAULT_DB_PATH: &str = "trailsync.db";

/// Which database a command runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Local(PathBuf),
    Remote { url: String, auth_token: String },
}

pub fn resolve_target(
    cli_db_path: Option<PathBuf>,
    cli_database_url: Option<String>,
) -> Result<DatabaseTarget, CliError> {
    resolve_target_with(cli_db_path, cli_database_url, |name| env::var(name).ok())
}

pub fn resolve_target_with(
    cli_db_path: Option<PathBuf>,
    cli_database_url: Option<String>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<DatabaseTarget, CliError> {
    if let Some(url) = cli_database_url {
        let auth_token = required_trimmed(&lookup, "TRAILSYNC_DATABASE_AUTH_TOKEN")?;
        return Ok(DatabaseTarget::Remote { url, auth_token });
    }

    let path = cli_db_path
        .or_else(|| {
            lookup("TRAILSYNC_DATABASE_PATH")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
    Ok(DatabaseTarget::Local(path))
}

/// Open the target, applying any pending migrations.
pub async fn open_database(target: &DatabaseTarget) -> Result<Database, CliError> {
    match target {
        DatabaseTarget::Local(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Ok(Database::open(path).await?)
        }
        DatabaseTarget::Remote { url, auth_token } => {
            Ok(Database::open_remote(url.as_str(), auth_token.as_str()).await?)
        }
    }
}

pub fn normalize_owner_arg(owner: &str) -> Result<String, CliError> {
    let owner = normalize_owner(owner);
    if owner.is_empty() {
        return Err(CliError::EmptyOwner);
    }
    Ok(owner)
}
