use trailsync_core::services::provision_account;
use trailsync_core::{Database, EngineConfig};

use crate::commands::common::normalize_owner_arg;
use crate::error::CliError;

pub async fn run_account_create(
    db: &Database,
    config: &EngineConfig,
    owner: &str,
) -> Result<String, CliError> {
    let owner = normalize_owner_arg(owner)?;
    let collection = provision_account(db.connection(), &owner, &config.quota_plan).await?;
    tracing::debug!(collection = %collection.id, "Account provisioned");
    Ok(format!("{owner}\t{}", collection.id))
}
