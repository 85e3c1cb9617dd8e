use trailsync_core::Database;

use crate::error::CliError;

/// Opening the database applies pending migrations; report where it ended up.
pub async fn run_migrate(db: &Database) -> Result<String, CliError> {
    let version = db.schema_version().await?;
    Ok(format!("Schema is at version {version}"))
}
