//! Bulk create, update and delete over any [`ResourceStore`]

use std::collections::{BTreeMap, HashMap, HashSet};

use futures::stream::{self, StreamExt};
use libsql::Connection;

use crate::config::EngineConfig;
use crate::db::record::{self, TableRecord};
use crate::db::{conditional_update, has_changes, QuotaLedger};
use crate::error::{Error, Result};
use crate::models::{Draft, KnownMarker, QuotaKind, Submission, SyncResult, Versioned};
use crate::sync::compute_sync;
use crate::util::{normalize_id, normalize_owner, now_millis, owner_fingerprint};

use super::reserve::{release, reserve, total_costs};
use super::store::ResourceStore;

/// A submitted item that could not be applied.
#[derive(Debug)]
pub struct ItemError {
    /// The id as submitted, when there was one.
    pub id: Option<String>,
    pub error: Error,
}

impl ItemError {
    fn new(id: Option<String>, error: Error) -> Self {
        Self { id, error }
    }
}

/// Result of a bulk create: stored records plus the items that were refused.
#[derive(Debug)]
pub struct BulkCreated<R> {
    pub records: Vec<R>,
    pub errors: Vec<ItemError>,
}

/// How a single conditional update ended.
enum Applied<R> {
    Updated(R),
    /// Another writer got there first. Holds the row as it is now, if it still exists.
    LostRace(Option<R>),
}

/// Generic write and sync operations for every resource kind.
pub struct BulkEngine<'a> {
    conn: &'a Connection,
    config: &'a EngineConfig,
}

impl<'a> BulkEngine<'a> {
    pub const fn new(conn: &'a Connection, config: &'a EngineConfig) -> Self {
        Self { conn, config }
    }

    const fn ledger(&self) -> QuotaLedger<'a> {
        QuotaLedger::new(self.conn)
    }

    fn window(&self) -> usize {
        self.config.bulk_concurrency.max(1)
    }

    /// Create records, tolerating resubmissions and partial failures.
    ///
    /// Items whose id already exists for the owner come back as stored; the
    /// resubmitted values are ignored. Per-item failures are collected in
    /// [`BulkCreated::errors`]. The call itself fails only when nothing could
    /// be returned, with the first item error, or when storage fails.
    pub async fn bulk_create<S: ResourceStore>(
        &self,
        store: &S,
        owner: &str,
        dtos: Vec<S::Dto>,
    ) -> Result<BulkCreated<S::Record>> {
        let owner = normalize_owner(owner);
        let submitted = dtos.len();
        let now = now_millis();
        let mut errors = Vec::new();

        let mut seen = HashSet::new();
        let mut drafts = Vec::with_capacity(dtos.len());
        for dto in dtos {
            let id = dto.submitted_id().map(str::to_string);
            match dto.validate() {
                Ok(draft) => {
                    if seen.insert(draft.id().to_string()) {
                        drafts.push(draft);
                    }
                }
                Err(error) => errors.push(ItemError::new(id, error)),
            }
        }

        let ids: Vec<String> = drafts.iter().map(|draft| draft.id().to_string()).collect();
        let mut records: Vec<S::Record> =
            record::find_by_ids(self.conn, &owner, &ids).await?;
        let existing: HashSet<String> = records.iter().map(|r| r.id().to_string()).collect();
        let existing_count = records.len();

        let owner_ref = owner.as_str();
        let prepared: Vec<(String, Result<S::Record>)> =
            stream::iter(drafts.into_iter().filter(|draft| !existing.contains(draft.id())))
                .map(move |draft| async move {
                    let id = draft.id().to_string();
                    let prepared = store.prepare_create(self.conn, owner_ref, draft, now).await;
                    (id, prepared)
                })
                .buffered(self.window())
                .collect()
                .await;

        let mut candidates = Vec::with_capacity(prepared.len());
        for (id, outcome) in prepared {
            match outcome {
                Ok(record) => candidates.push(record),
                Err(error) if error.is_item_error() => errors.push(ItemError::new(Some(id), error)),
                Err(error) => return Err(error),
            }
        }

        let ledger = self.ledger();
        let reservation = reserve(&ledger, &owner, store, candidates).await?;
        for (record, kind) in reservation.rejected {
            errors.push(ItemError::new(
                Some(record.id().to_string()),
                Error::QuotaExceeded(kind),
            ));
        }

        let created = self
            .insert_reserved(store, &ledger, &owner, reservation.admitted)
            .await?;
        let created_count = created.len();
        records.extend(created);

        tracing::info!(
            kind = %S::Record::KIND,
            owner = %owner_fingerprint(&owner),
            submitted,
            existing = existing_count,
            created = created_count,
            errors = errors.len(),
            "Bulk create finished"
        );

        if records.is_empty() && !errors.is_empty() {
            return Err(errors.swap_remove(0).error);
        }
        Ok(BulkCreated { records, errors })
    }

    /// Insert records whose quota is already reserved, in chunks.
    ///
    /// A failing chunk is retried one row at a time. A duplicate key means a
    /// concurrent request created the row first: its reservation is released
    /// and the stored row returned instead. Any other failure releases every
    /// reservation not yet backed by a row and aborts.
    async fn insert_reserved<S: ResourceStore>(
        &self,
        store: &S,
        ledger: &QuotaLedger<'_>,
        owner: &str,
        admitted: Vec<S::Record>,
    ) -> Result<Vec<S::Record>> {
        let mut created = Vec::with_capacity(admitted.len());
        let chunk_size = self.config.insert_chunk_size.max(1);

        let mut offset = 0;
        while offset < admitted.len() {
            let end = (offset + chunk_size).min(admitted.len());
            let chunk = &admitted[offset..end];

            if let Err(batch_error) = record::insert_batch(self.conn, chunk).await {
                tracing::debug!(
                    kind = %S::Record::KIND,
                    rows = chunk.len(),
                    error = %batch_error,
                    "Batch insert failed, inserting one at a time"
                );
                for (position, candidate) in chunk.iter().enumerate() {
                    match record::insert_batch(self.conn, std::slice::from_ref(candidate)).await {
                        Ok(()) => created.push(candidate.clone()),
                        Err(error) if error.is_unique_violation() => {
                            release(ledger, owner, &total_costs(store, [candidate])).await;
                            if let Some(current) =
                                record::find_one::<S::Record>(self.conn, owner, candidate.id())
                                    .await?
                            {
                                created.push(current);
                            }
                        }
                        Err(error) => {
                            let unbacked = &admitted[offset + position..];
                            release(ledger, owner, &total_costs(store, unbacked)).await;
                            return Err(error);
                        }
                    }
                }
            } else {
                created.extend_from_slice(chunk);
            }
            offset = end;
        }
        Ok(created)
    }

    /// Apply client edits, skipping stale and unchanged items.
    ///
    /// A stale version or a no-op edit returns the stored record unchanged.
    /// Unknown and foreign ids are ignored. When every matched item fails a
    /// companion check the first such error is returned.
    pub async fn bulk_update<S: ResourceStore>(
        &self,
        store: &S,
        owner: &str,
        dtos: Vec<S::Dto>,
    ) -> Result<Vec<S::Record>> {
        let owner = normalize_owner(owner);
        let submitted = dtos.len();

        let mut drafts: HashMap<String, (i64, S::Draft)> = HashMap::with_capacity(dtos.len());
        let mut order = Vec::with_capacity(dtos.len());
        for dto in dtos {
            let draft = match dto.validate() {
                Ok(draft) => draft,
                Err(error) => {
                    tracing::debug!(kind = %S::Record::KIND, error = %error, "Dropping invalid update");
                    continue;
                }
            };
            let Some(version) = draft.version() else {
                tracing::debug!(kind = %S::Record::KIND, "Dropping update without version");
                continue;
            };
            let id = draft.id().to_string();
            if !drafts.contains_key(&id) {
                order.push(id.clone());
                drafts.insert(id, (version, draft));
            }
        }

        let stored: Vec<S::Record> = record::find_by_ids(self.conn, &owner, &order).await?;
        let pairs: Vec<(S::Record, i64, S::Draft)> = stored
            .into_iter()
            .filter_map(|record| {
                drafts
                    .remove(record.id())
                    .map(|(version, draft)| (record, version, draft))
            })
            .collect();
        let matched = pairs.len();

        let outcomes: Vec<Result<Option<S::Record>>> = stream::iter(pairs)
            .map(|(stored, version, draft)| self.update_item(store, stored, version, draft))
            .buffer_unordered(self.window())
            .collect()
            .await;

        let mut records = Vec::with_capacity(outcomes.len());
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(error) if error.is_item_error() => {
                    tracing::debug!(kind = %S::Record::KIND, error = %error, "Update item rejected");
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
                Err(error) => return Err(error),
            }
        }

        tracing::info!(
            kind = %S::Record::KIND,
            owner = %owner_fingerprint(&owner),
            submitted,
            matched,
            returned = records.len(),
            "Bulk update finished"
        );

        match first_error {
            Some(error) if records.is_empty() => Err(error),
            _ => Ok(records),
        }
    }

    async fn update_item<S: ResourceStore>(
        &self,
        store: &S,
        stored: S::Record,
        version: i64,
        draft: S::Draft,
    ) -> Result<Option<S::Record>> {
        if version != stored.version() {
            tracing::debug!(
                kind = %S::Record::KIND,
                presented = version,
                stored = stored.version(),
                "Stale update skipped"
            );
            return Ok(Some(stored));
        }
        let candidate = store.prepare_update(self.conn, &stored, draft).await?;
        if !has_changes(&stored, &candidate) {
            return Ok(Some(stored));
        }
        match self.apply_update(store, &stored, candidate).await? {
            Applied::Updated(record) => Ok(Some(record)),
            Applied::LostRace(current) => Ok(current),
        }
    }

    /// Update one record, failing on a version mismatch instead of skipping.
    pub async fn update_strict<S: ResourceStore>(
        &self,
        store: &S,
        owner: &str,
        dto: S::Dto,
    ) -> Result<S::Record> {
        let owner = normalize_owner(owner);
        let draft = dto.validate()?;
        let version = draft.version().ok_or(Error::Missing("version"))?;
        let id = draft.id().to_string();
        let conflict = || Error::Conflict {
            kind: S::Record::KIND,
            id: id.clone(),
        };

        let stored: S::Record = record::require_one(self.conn, &owner, &id).await?;
        if version != stored.version() {
            return Err(conflict());
        }
        let candidate = store.prepare_update(self.conn, &stored, draft).await?;
        if !has_changes(&stored, &candidate) {
            return Ok(stored);
        }
        match self.apply_update(store, &stored, candidate).await? {
            Applied::Updated(record) => Ok(record),
            Applied::LostRace(_) => Err(conflict()),
        }
    }

    /// Reserve quota growth, compare-and-set, then settle quota and side effects.
    async fn apply_update<S: ResourceStore>(
        &self,
        store: &S,
        stored: &S::Record,
        candidate: S::Record,
    ) -> Result<Applied<S::Record>> {
        let owner = stored.owner();
        let ledger = self.ledger();
        let deltas = quota_deltas(store, stored, &candidate);

        let mut grown = BTreeMap::new();
        for (kind, delta) in deltas.iter().filter(|(_, delta)| **delta > 0) {
            if let Err(error) = ledger.update(owner, *kind, *delta).await {
                release(&ledger, owner, &grown).await;
                return Err(error);
            }
            grown.insert(*kind, *delta);
        }

        let now = now_millis();
        let applied = match conditional_update(self.conn, &candidate, stored.version(), now).await {
            Ok(applied) => applied,
            Err(error) => {
                release(&ledger, owner, &grown).await;
                return Err(error);
            }
        };

        if applied == 0 {
            release(&ledger, owner, &grown).await;
            let current = record::find_one::<S::Record>(self.conn, owner, stored.id()).await?;
            tracing::debug!(kind = %S::Record::KIND, "Conditional update lost a race");
            return Ok(Applied::LostRace(current));
        }

        // The row is committed from here on: later failures are logged, not returned.
        let shrunk: BTreeMap<QuotaKind, i64> = deltas
            .iter()
            .filter(|(_, delta)| **delta < 0)
            .map(|(kind, delta)| (*kind, -*delta))
            .collect();
        release(&ledger, owner, &shrunk).await;

        let mut updated = candidate;
        updated.stamp(stored.version() + 1, now);
        if let Err(error) = store.after_update(self.conn, stored, &updated).await {
            tracing::warn!(
                kind = %S::Record::KIND,
                error = %error,
                "Post-update side effect failed"
            );
        }
        Ok(Applied::Updated(updated))
    }

    /// Delete owned records among `ids` with their dependents.
    ///
    /// Unknown and foreign ids are ignored, as are records the store protects.
    /// Returns the number of records removed by this call.
    pub async fn bulk_delete<S: ResourceStore>(
        &self,
        store: &S,
        owner: &str,
        ids: Vec<String>,
    ) -> Result<usize> {
        let owner = normalize_owner(owner);
        let mut seen = HashSet::new();
        let ids: Vec<String> = ids
            .iter()
            .map(|id| normalize_id(id))
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();

        let found: Vec<S::Record> = record::find_by_ids(self.conn, &owner, &ids).await?;
        let targets: Vec<S::Record> = found
            .into_iter()
            .filter(|record| store.deletable(record))
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }

        let ledger = self.ledger();
        store
            .cascade_delete(self.conn, &ledger, &owner, &targets)
            .await?;

        let target_ids: Vec<String> = targets.iter().map(|r| r.id().to_string()).collect();
        let removed: HashSet<String> =
            record::delete_by_ids::<S::Record>(self.conn, &owner, &target_ids)
                .await?
                .into_iter()
                .collect();
        let freed = total_costs(
            store,
            targets.iter().filter(|record| removed.contains(record.id())),
        );
        for (kind, amount) in &freed {
            ledger.decrement(&owner, *kind, *amount).await?;
        }

        tracing::info!(
            kind = %S::Record::KIND,
            owner = %owner_fingerprint(&owner),
            requested = ids.len(),
            removed = removed.len(),
            "Bulk delete finished"
        );
        Ok(removed.len())
    }

    /// Differential sync of everything `owner` can see of this kind.
    pub async fn get_updates<S: ResourceStore>(
        &self,
        store: &S,
        owner: &str,
        known: Vec<KnownMarker>,
    ) -> Result<SyncResult<S::Record>> {
        let owner = normalize_owner(owner);
        let visible = store.visible(self.conn, &owner).await?;
        compute_sync(visible, known)
    }
}

/// Per-kind quota change from `before` to `after`, zero deltas omitted.
fn quota_deltas<S: ResourceStore>(
    store: &S,
    before: &S::Record,
    after: &S::Record,
) -> BTreeMap<QuotaKind, i64> {
    let mut deltas = total_costs(store, [after]);
    for (kind, amount) in total_costs(store, [before]) {
        *deltas.entry(kind).or_insert(0) -= amount;
    }
    deltas.retain(|_, delta| *delta != 0);
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{
        CollectionDto, CollectionType, QuotaPlan, ResourceKey, TrackDto, Trail, TrailDto,
    };
    use crate::stores::test_support::*;
    use crate::stores::{CollectionStore, TrackStore, TrailStore};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use pretty_assertions::assert_eq;

    async fn trail_dto(db: &Database, collection: &str, n: u64) -> TrailDto {
        seed_track(db, n + 1).await;
        seed_track(db, n + 2).await;
        TrailDto {
            id: Some(uuid(n)),
            name: Some(format!("Trail {n}")),
            collection_uuid: Some(collection.to_string()),
            original_track_uuid: Some(uuid(n + 1)),
            current_track_uuid: Some(uuid(n + 2)),
            ..TrailDto::default()
        }
    }

    fn renamed(trail: &Trail, name: &str, version: i64) -> TrailDto {
        TrailDto {
            version: Some(version),
            name: Some(name.to_string()),
            ..TrailDto::from(trail)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resubmitted_create_returns_stored_record() {
        let db = Database::open_in_memory().await.unwrap();
        let collection = provision(&db).await;
        let config = EngineConfig::default();
        let engine = BulkEngine::new(db.connection(), &config);
        let dto = trail_dto(&db, &collection.id, 10).await;

        let first = engine
            .bulk_create(&TrailStore, OWNER, vec![dto.clone()])
            .await
            .unwrap();
        let mut resubmitted = dto;
        resubmitted.name = Some("Different".to_string());
        let second = engine
            .bulk_create(&TrailStore, "ANN@example.com", vec![resubmitted.clone(), resubmitted])
            .await
            .unwrap();

        assert_eq!(first.records, second.records);
        assert!(second.errors.is_empty());
        assert_eq!(second.records[0].name, "Trail 10");
        assert_eq!(used(&db, QuotaKind::Trails).await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_is_trimmed_to_remaining_quota() {
        let db = Database::open_in_memory().await.unwrap();
        let mut plan = QuotaPlan::default();
        plan.set_max(QuotaKind::Trails, 5);
        let collection = provision_with(&db, &plan).await;
        for n in [10, 20, 30, 40] {
            seed_trail(&db, &collection.id, n).await;
        }
        let config = EngineConfig::default();
        let engine = BulkEngine::new(db.connection(), &config);
        let mut dtos = Vec::new();
        for n in [100, 110, 120] {
            dtos.push(trail_dto(&db, &collection.id, n).await);
        }

        let created = engine.bulk_create(&TrailStore, OWNER, dtos).await.unwrap();

        assert_eq!(created.records.len(), 1);
        assert_eq!(created.records[0].id, uuid(100));
        let codes: Vec<String> = created.errors.iter().map(|e| e.error.code()).collect();
        assert_eq!(codes, vec!["quota-exceeded-trails", "quota-exceeded-trails"]);
        assert_eq!(used(&db, QuotaKind::Trails).await, 5);
        assert_eq!(count(&db, "trails").await, 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_fails_with_first_error_when_nothing_is_stored() {
        let db = Database::open_in_memory().await.unwrap();
        let collection = provision(&db).await;
        let config = EngineConfig::default();
        let engine = BulkEngine::new(db.connection(), &config);
        let mut missing_name = trail_dto(&db, &collection.id, 10).await;
        missing_name.name = None;
        let mut bad_collection = trail_dto(&db, &collection.id, 20).await;
        bad_collection.collection_uuid = Some(uuid(999));

        let error = engine
            .bulk_create(&TrailStore, OWNER, vec![missing_name, bad_collection])
            .await
            .unwrap_err();
        assert_eq!(error.code(), "missing-name");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_update_returns_stored_state() {
        let db = Database::open_in_memory().await.unwrap();
        let collection = provision(&db).await;
        let trail = seed_trail(&db, &collection.id, 10).await;
        let config = EngineConfig::default();
        let engine = BulkEngine::new(db.connection(), &config);

        let first = engine
            .bulk_update(&TrailStore, OWNER, vec![renamed(&trail, "Device A", 1)])
            .await
            .unwrap();
        assert_eq!(first[0].version, 2);

        let stale = engine
            .bulk_update(&TrailStore, OWNER, vec![renamed(&trail, "Device B", 1)])
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].version, 2);
        assert_eq!(stale[0].name, "Device A");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unchanged_update_keeps_version() {
        let db = Database::open_in_memory().await.unwrap();
        let collection = provision(&db).await;
        let trail = seed_trail(&db, &collection.id, 10).await;
        let config = EngineConfig::default();
        let engine = BulkEngine::new(db.connection(), &config);

        let result = engine
            .bulk_update(&TrailStore, OWNER, vec![TrailDto::from(&trail)])
            .await
            .unwrap();

        assert_eq!(result, vec![trail.clone()]);
        let stored: Trail = record::require_one(db.connection(), OWNER, &trail.id)
            .await
            .unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.updated_at, trail.updated_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bulk_update_ignores_foreign_unknown_and_versionless_items() {
        let db = Database::open_in_memory().await.unwrap();
        let collection = provision(&db).await;
        let trail = seed_trail(&db, &collection.id, 10).await;
        let config = EngineConfig::default();
        let engine = BulkEngine::new(db.connection(), &config);

        let mut versionless = renamed(&trail, "No version", 1);
        versionless.version = None;
        let mut unknown = renamed(&trail, "Unknown", 1);
        unknown.id = Some(uuid(500));
        let foreign = engine
            .bulk_update(&TrailStore, "eve@example.com", vec![renamed(&trail, "Eve", 1)])
            .await
            .unwrap();
        assert!(foreign.is_empty());

        let result = engine
            .bulk_update(
                &TrailStore,
                OWNER,
                vec![versionless, unknown, renamed(&trail, "Kept", 1)],
            )
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "Kept");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_updates_bump_version_once() {
        let db = Database::open_in_memory().await.unwrap();
        let collection = provision(&db).await;
        let trail = seed_trail(&db, &collection.id, 10).await;
        let config = EngineConfig::default();
        let engine = BulkEngine::new(db.connection(), &config);

        let (a, b) = tokio::join!(
            engine.bulk_update(&TrailStore, OWNER, vec![renamed(&trail, "A", 1)]),
            engine.bulk_update(&TrailStore, OWNER, vec![renamed(&trail, "B", 1)])
        );
        a.unwrap();
        b.unwrap();

        let stored: Trail = record::require_one(db.connection(), OWNER, &trail.id)
            .await
            .unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_creates_of_the_same_ids_store_each_once() {
        let db = Database::open_in_memory().await.unwrap();
        let collection = provision(&db).await;
        let mut dtos = Vec::new();
        for n in [10, 20, 30] {
            dtos.push(trail_dto(&db, &collection.id, n).await);
        }
        let config = EngineConfig::default();
        let engine = BulkEngine::new(db.connection(), &config);

        let (a, b) = tokio::join!(
            engine.bulk_create(&TrailStore, OWNER, dtos.clone()),
            engine.bulk_create(&TrailStore, OWNER, dtos.clone())
        );
        assert_eq!(a.unwrap().records.len(), 3);
        assert_eq!(b.unwrap().records.len(), 3);
        assert_eq!(count(&db, "trails").await, 3);
        assert_eq!(used(&db, QuotaKind::Trails).await, 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_batch_insert_falls_back_to_single_rows() {
        let db = Database::open_in_memory().await.unwrap();
        let collection = provision(&db).await;
        let existing = seed_trail(&db, &collection.id, 10).await;
        let dto = trail_dto(&db, &collection.id, 20).await;
        let fresh = TrailStore
            .prepare_create(db.connection(), OWNER, dto.validate().unwrap(), now_millis())
            .await
            .unwrap();

        // Reservations for both rows, as bulk_create would have taken them.
        let ledger = QuotaLedger::new(db.connection());
        ledger.increment(OWNER, QuotaKind::Trails, 2).await.unwrap();
        assert_eq!(used(&db, QuotaKind::Trails).await, 3);

        let mut duplicate = existing.clone();
        duplicate.name = "Renamed elsewhere".to_string();
        let config = EngineConfig::default();
        let engine = BulkEngine::new(db.connection(), &config);
        let created = engine
            .insert_reserved(&TrailStore, &ledger, OWNER, vec![duplicate, fresh.clone()])
            .await
            .unwrap();

        assert_eq!(created.len(), 2);
        assert_eq!(created[0].id, existing.id);
        assert_eq!(created[0].name, "Trail 10");
        assert_eq!(created[1].id, fresh.id);
        assert_eq!(count(&db, "trails").await, 2);
        assert_eq!(used(&db, QuotaKind::Trails).await, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn committed_update_survives_side_effect_failure() {
        let db = Database::open_in_memory().await.unwrap();
        let default = provision(&db).await;
        let trail = seed_trail(&db, &default.id, 10).await;
        let config = EngineConfig::default();
        let engine = BulkEngine::new(db.connection(), &config);
        engine
            .bulk_create(
                &CollectionStore,
                OWNER,
                vec![CollectionDto {
                    id: Some(uuid(1)),
                    version: None,
                    name: Some("Alps".to_string()),
                    collection_type: Some(CollectionType::Custom),
                }],
            )
            .await
            .unwrap();
        db.connection()
            .execute("DROP TABLE trail_tags", ())
            .await
            .unwrap();

        let moved = engine
            .bulk_update(
                &TrailStore,
                OWNER,
                vec![TrailDto {
                    collection_uuid: Some(uuid(1)),
                    ..TrailDto::from(&trail)
                }],
            )
            .await
            .unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].version, 2);
        assert_eq!(moved[0].collection_uuid, uuid(1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn committed_shrink_survives_release_failure() {
        let db = Database::open_in_memory().await.unwrap();
        provision(&db).await;
        let track = seed_track(&db, 5).await;
        let config = EngineConfig::default();
        let engine = BulkEngine::new(db.connection(), &config);
        db.connection()
            .execute("DROP TABLE quotas", ())
            .await
            .unwrap();

        let shrunk = engine
            .bulk_update(
                &TrackStore,
                OWNER,
                vec![TrackDto {
                    id: Some(track.id.clone()),
                    version: Some(1),
                    data: Some(STANDARD.encode([1_u8; 4])),
                }],
            )
            .await
            .unwrap();
        assert_eq!(shrunk.len(), 1);
        assert_eq!(shrunk[0].version, 2);
        assert_eq!(shrunk[0].data.len(), 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn strict_update_reports_conflicts() {
        let db = Database::open_in_memory().await.unwrap();
        let collection = provision(&db).await;
        let trail = seed_trail(&db, &collection.id, 10).await;
        let config = EngineConfig::default();
        let engine = BulkEngine::new(db.connection(), &config);

        let updated = engine
            .update_strict(&TrailStore, OWNER, renamed(&trail, "Fresh", 1))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        let stale = engine
            .update_strict(&TrailStore, OWNER, renamed(&trail, "Stale", 1))
            .await;
        assert!(matches!(stale, Err(Error::Conflict { .. })));

        let mut missing = renamed(&trail, "Gone", 1);
        missing.id = Some(uuid(500));
        let error = engine
            .update_strict(&TrailStore, OWNER, missing)
            .await
            .unwrap_err();
        assert_eq!(error.code(), "trail-not-found");

        let mut versionless = renamed(&trail, "No version", 2);
        versionless.version = None;
        let result = engine.update_strict(&TrailStore, OWNER, versionless).await;
        assert!(matches!(result, Err(Error::Missing("version"))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_reports_created_updated_and_deleted() {
        let db = Database::open_in_memory().await.unwrap();
        let collection = provision(&db).await;
        let kept = seed_trail(&db, &collection.id, 10).await;
        let edited = seed_trail(&db, &collection.id, 20).await;
        let removed = seed_trail(&db, &collection.id, 30).await;
        let config = EngineConfig::default();
        let engine = BulkEngine::new(db.connection(), &config);
        let known: Vec<KnownMarker> = [&kept, &edited, &removed]
            .iter()
            .map(|trail| KnownMarker {
                id: trail.id.clone(),
                owner: trail.owner.clone(),
                version: trail.version,
            })
            .collect();

        engine
            .bulk_update(&TrailStore, OWNER, vec![renamed(&edited, "Edited", 1)])
            .await
            .unwrap();
        engine
            .bulk_delete(&TrailStore, OWNER, vec![removed.id.clone()])
            .await
            .unwrap();
        let added = seed_trail(&db, &collection.id, 40).await;

        let diff = engine.get_updates(&TrailStore, OWNER, known).await.unwrap();

        assert_eq!(diff.created, vec![added]);
        assert_eq!(diff.updated.len(), 1);
        assert_eq!(diff.updated[0].name, "Edited");
        assert_eq!(diff.deleted, vec![ResourceKey::new(&removed.id, OWNER)]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_is_owner_scoped_and_counts_removed_rows() {
        let db = Database::open_in_memory().await.unwrap();
        let collection = provision(&db).await;
        let trail = seed_trail(&db, &collection.id, 10).await;
        let config = EngineConfig::default();
        let engine = BulkEngine::new(db.connection(), &config);

        let foreign = engine
            .bulk_delete(&TrailStore, "eve@example.com", vec![trail.id.clone()])
            .await
            .unwrap();
        assert_eq!(foreign, 0);

        let removed = engine
            .bulk_delete(
                &TrailStore,
                OWNER,
                vec![trail.id.to_uppercase(), trail.id.clone(), uuid(777)],
            )
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let again = engine
            .bulk_delete(&TrailStore, OWNER, vec![trail.id.clone()])
            .await
            .unwrap();
        assert_eq!(again, 0);
        assert_eq!(used(&db, QuotaKind::Trails).await, 0);
    }
}
