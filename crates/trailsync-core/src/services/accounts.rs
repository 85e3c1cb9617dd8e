//! Account provisioning

use libsql::{Connection, Value};
use uuid::Uuid;

use crate::db::record::{self, TableRecord};
use crate::db::QuotaLedger;
use crate::error::{Error, Result};
use crate::models::{Collection, CollectionType, QuotaKind, QuotaPlan};
use crate::util::{normalize_owner, now_millis, owner_fingerprint};

pub const DEFAULT_COLLECTION_NAME: &str = "My Trails";

/// The owner's `MY_TRAILS` collection, if provisioned.
pub async fn default_collection(conn: &Connection, owner: &str) -> Result<Option<Collection>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE owner = ? AND collection_type = ?",
        record::select_columns::<Collection>(None),
        Collection::TABLE
    );
    let found = record::query_records::<Collection>(
        conn,
        &sql,
        vec![
            Value::Text(normalize_owner(owner)),
            Value::Text(CollectionType::MyTrails.as_str().to_string()),
        ],
    )
    .await?;
    Ok(found.into_iter().next())
}

/// Create quota counters from `plan` and the default collection.
///
/// Safe to repeat and to race: counters are only inserted when missing and
/// the default collection is unique per owner.
pub async fn provision_account(
    conn: &Connection,
    owner: &str,
    plan: &QuotaPlan,
) -> Result<Collection> {
    let owner = normalize_owner(owner);
    if owner.is_empty() {
        return Err(Error::Missing("owner"));
    }
    let ledger = QuotaLedger::new(conn);
    ledger.provision(&owner, plan).await?;

    if let Some(existing) = default_collection(conn, &owner).await? {
        return Ok(existing);
    }

    ledger.increment(&owner, QuotaKind::Collections, 1).await?;
    let now = now_millis();
    let collection = Collection {
        id: Uuid::now_v7().to_string(),
        owner: owner.clone(),
        version: 1,
        created_at: now,
        updated_at: now,
        name: DEFAULT_COLLECTION_NAME.to_string(),
        collection_type: CollectionType::MyTrails,
    };

    match record::insert_batch(conn, std::slice::from_ref(&collection)).await {
        Ok(()) => {
            tracing::info!(owner = %owner_fingerprint(&owner), "Provisioned account");
            Ok(collection)
        }
        Err(error) if error.is_unique_violation() => {
            ledger.decrement(&owner, QuotaKind::Collections, 1).await?;
            default_collection(conn, &owner)
                .await?
                .ok_or_else(|| Error::Database("default collection disappeared".to_string()))
        }
        Err(error) => {
            if let Err(release_error) = ledger.decrement(&owner, QuotaKind::Collections, 1).await {
                tracing::warn!(error = %release_error, "Failed to release collection quota");
            }
            Err(error)
        }
    }
}
