//! Track store

use libsql::{Connection, Row, Value};

use crate::db::record::{self, RowReader, TableRecord};
use crate::engine::ResourceStore;
use crate::error::Result;
use crate::models::{QuotaCost, QuotaKind, ResourceKind, Track, TrackDraft, TrackDto};

use super::shares;

impl TableRecord for Track {
    const TABLE: &'static str = "tracks";
    const KIND: ResourceKind = ResourceKind::Track;
    const COLUMNS: &'static [&'static str] = &["data"];
    const MUTABLE_COLUMNS: &'static [&'static str] = &["data"];

    fn column_values(&self) -> Vec<Value> {
        self.mutable_values()
    }

    fn mutable_values(&self) -> Vec<Value> {
        vec![Value::Blob(self.data.clone())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let mut r = RowReader::new(row);
        Ok(Self {
            id: r.text()?,
            owner: r.text()?,
            version: r.integer()?,
            created_at: r.integer()?,
            updated_at: r.integer()?,
            data: r.blob()?,
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
pub struct TrackStore;

impl ResourceStore for TrackStore {
    type Record = Track;
    type Dto = TrackDto;
    type Draft = TrackDraft;

    async fn prepare_create(
        &self,
        _conn: &Connection,
        owner: &str,
        draft: TrackDraft,
        now: i64,
    ) -> Result<Track> {
        Ok(Track::from_draft(owner, draft, now))
    }

    async fn prepare_update(
        &self,
        _conn: &Connection,
        stored: &Track,
        draft: TrackDraft,
    ) -> Result<Track> {
        Ok(stored.with_changes(draft))
    }

    fn quota_costs(&self, record: &Track) -> Vec<QuotaCost> {
        vec![
            QuotaCost::one(QuotaKind::Tracks),
            QuotaCost::new(QuotaKind::TrackBytes, record.size()),
        ]
    }

    async fn visible(&self, conn: &Connection, owner: &str) -> Result<Vec<Track>> {
        let columns = record::select_columns::<Track>(Some("k"));
        let sql = format!(
            "SELECT {columns} FROM tracks k WHERE k.owner = ?
             UNION ALL
             SELECT {columns} FROM tracks k
             JOIN ({shared}) st ON st.trail_owner = k.owner
                AND (k.id = st.original_track_uuid OR k.id = st.current_track_uuid)",
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
