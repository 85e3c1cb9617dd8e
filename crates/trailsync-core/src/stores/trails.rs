//! Trail store

use libsql::{Connection, Row, Value};

use crate::db::record::{
    self, optional_integer_value, optional_text_value, RowReader, TableRecord,
};
use crate::db::QuotaLedger;
use crate::engine::ResourceStore;
use crate::error::{Error, Result};
use crate::models::{
    Collection, QuotaCost, QuotaKind, ResourceKind, Track, Trail, TrailDraft, TrailDto,
};

use super::{owner_and, shares, tags};

impl TableRecord for Trail {
    const TABLE: &'static str = "trails";
    const KIND: ResourceKind = ResourceKind::Trail;
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "description",
        "location",
        "date",
        "loop_type",
        "activity",
        "collection_uuid",
        "current_track_uuid",
        "original_track_uuid",
    ];
    const MUTABLE_COLUMNS: &'static [&'static str] = &[
        "name",
        "description",
        "location",
        "date",
        "loop_type",
        "activity",
        "collection_uuid",
        "current_track_uuid",
    ];

    fn column_values(&self) -> Vec<Value> {
        let mut values = self.mutable_values();
        values.push(Value::Text(self.original_track_uuid.clone()));
        values
    }

    fn mutable_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            Value::Text(self.description.clone()),
            Value::Text(self.location.clone()),
            optional_integer_value(self.date),
            optional_text_value(self.loop_type.as_ref()),
            optional_text_value(self.activity.as_ref()),
            Value::Text(self.collection_uuid.clone()),
            Value::Text(self.current_track_uuid.clone()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let mut r = RowReader::new(row);
        Ok(Self {
            id: r.text()?,
            owner: r.text()?,
            version: r.integer()?,
            created_at: r.integer()?,
            updated_at: r.integer()?,
            name: r.text()?,
            description: r.text()?,
            location: r.text()?,
            date: r.optional_integer()?,
            loop_type: r.optional_text()?,
            activity: r.optional_text()?,
            collection_uuid: r.text()?,
            current_track_uuid: r.text()?,
            original_track_uuid: r.text()?,
        })
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn stamp(&mut self, version: i64, updated_at: i64) {
        self.version = version;
        self.updated_at = updated_at;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrailStore;

impl ResourceStore for TrailStore {
    type Record = Trail;
    type Dto = TrailDto;
    type Draft = TrailDraft;

    async fn prepare_create(
        &self,
        conn: &Connection,
        owner: &str,
        draft: TrailDraft,
        now: i64,
    ) -> Result<Trail> {
        let collection: Collection =
            record::require_one(conn, owner, &draft.collection_uuid).await?;
        if !collection.collection_type.holds_trails() {
            return Err(Error::forbidden(format!(
                "{} collections cannot hold trails",
                collection.collection_type
            )));
        }
        let tracks = [
            draft.original_track_uuid.clone(),
            draft.current_track_uuid.clone(),
        ];
        record::require_all::<Track>(conn, owner, &tracks).await?;
        Ok(Trail::from_draft(owner, draft, now))
    }

    async fn prepare_update(
        &self,
        conn: &Connection,
        stored: &Trail,
        draft: TrailDraft,
    ) -> Result<Trail> {
        let candidate = stored.with_changes(draft);
        let owner = stored.owner.as_str();

        if candidate.collection_uuid != stored.collection_uuid {
            let target: Collection =
                record::require_one(conn, owner, &candidate.collection_uuid).await?;
            let source: Option<Collection> =
                record::find_one(conn, owner, &stored.collection_uuid).await?;
            let allowed = source.map_or_else(
                || target.collection_type.holds_trails(),
                |source| {
                    source
                        .collection_type
                        .can_move_trail_to(target.collection_type)
                },
            );
            if !allowed {
                return Err(Error::forbidden(format!(
                    "trail cannot move to a {} collection",
                    target.collection_type
                )));
            }
        }

        if candidate.current_track_uuid != stored.current_track_uuid {
            record::require_all::<Track>(conn, owner, &[candidate.current_track_uuid.clone()])
                .await?;
        }
        Ok(candidate)
    }

    async fn after_update(&self, conn: &Connection, before: &Trail, after: &Trail) -> Result<()> {
        if before.collection_uuid == after.collection_uuid {
            return Ok(());
        }
        // Tags belong to one collection: links to tags left behind go away.
        let unlinked = conn
            .execute(
                "DELETE FROM trail_tags
                 WHERE owner = ?1 AND trail_uuid = ?2
                   AND tag_uuid NOT IN (
                       SELECT id FROM tags WHERE owner = ?1 AND collection_uuid = ?3
                   )",
                libsql::params![
                    after.owner.as_str(),
                    after.id.as_str(),
                    after.collection_uuid.as_str()
                ],
            )
            .await?;
        tracing::debug!(unlinked, "Removed tag links after trail move");
        Ok(())
    }

    fn quota_costs(&self, _record: &Trail) -> Vec<QuotaCost> {
        vec![QuotaCost::one(QuotaKind::Trails)]
    }

    async fn cascade_delete(
        &self,
        conn: &Connection,
        ledger: &QuotaLedger<'_>,
        owner: &str,
        records: &[Trail],
    ) -> Result<()> {
        let ids: Vec<String> = records.iter().map(|trail| trail.id.clone()).collect();
        remove_trail_dependents(conn, ledger, owner, &ids).await
    }

    async fn visible(&self, conn: &Connection, owner: &str) -> Result<Vec<Trail>> {
        let columns = record::select_columns::<Trail>(Some("t"));
        let sql = format!(
            "SELECT {columns} FROM trails t WHERE t.owner = ?
             UNION ALL
             SELECT {columns} FROM trails t
             JOIN ({shared}) st ON st.trail_id = t.id AND st.trail_owner = t.owner",
            shared = shares::shared_trails_sql(false)
        );
        record::query_records(
            conn,
            &sql,
            vec![Value::Text(owner.to_string()), Value::Text(owner.to_string())],
        )
        .await
    }
}

/// Delete links, photos and tracks of the given trails, releasing their quota.
pub(crate) async fn remove_trail_dependents(
    conn: &Connection,
    ledger: &QuotaLedger<'_>,
    owner: &str,
    trail_ids: &[String],
) -> Result<()> {
    if trail_ids.is_empty() {
        return Ok(());
    }
    let list = record::placeholders(trail_ids.len());

    tags::remove_links(conn, owner, "trail_uuid", trail_ids).await?;

    let photo_sizes = record::query_integers(
        conn,
        &format!("DELETE FROM photos WHERE owner = ? AND trail_uuid IN ({list}) RETURNING size"),
        owner_and(owner, trail_ids),
    )
    .await?;
    ledger
        .decrement(owner, QuotaKind::PhotoBytes, photo_sizes.iter().sum())
        .await?;

    let mut params = vec![Value::Text(owner.to_string())];
    params.extend(owner_and(owner, trail_ids));
    params.extend(owner_and(owner, trail_ids));
    let track_sizes = record::query_integers(
        conn,
        &format!(
            "DELETE FROM tracks WHERE owner = ? AND id IN (
                 SELECT original_track_uuid FROM trails WHERE owner = ? AND id IN ({list})
                 UNION
                 SELECT current_track_uuid FROM trails WHERE owner = ? AND id IN ({list})
             ) RETURNING length(data)"
        ),
        params,
    )
    .await?;
    let removed_tracks = i64::try_from(track_sizes.len()).unwrap_or(i64::MAX);
    ledger
        .decrement(owner, QuotaKind::Tracks, removed_tracks)
        .await?;
    ledger
        .decrement(owner, QuotaKind::TrackBytes, track_sizes.iter().sum())
        .await?;
    Ok(())
}

/// Delete trails that are not themselves the target of a bulk delete.
pub(crate) async fn remove_trails(
    conn: &Connection,
    ledger: &QuotaLedger<'_>,
    owner: &str,
    trail_ids: &[String],
) -> Result<()> {
    if trail_ids.is_empty() {
        return Ok(());
    }
    remove_trail_dependents(conn, ledger, owner, trail_ids).await?;
    let removed = record::delete_by_ids::<Trail>(conn, owner, trail_ids).await?;
    let removed = i64::try_from(removed.len()).unwrap_or(i64::MAX);
    ledger.decrement(owner, QuotaKind::Trails, removed).await
}
