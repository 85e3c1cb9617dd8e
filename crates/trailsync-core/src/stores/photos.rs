//! Photo store

use libsql::{Connection, Row, Value};

use crate::db::record::{
    self, bool_value, optional_integer_value, optional_real_value, RowReader, TableRecord,
};
use crate::engine::ResourceStore;
use crate::error::Result;
use crate::models::{Photo, PhotoDraft, PhotoDto, QuotaCost, QuotaKind, ResourceKind, Trail};

use super::shares;

impl TableRecord for Photo {
    const TABLE: &'static str = "photos";
    const KIND: ResourceKind = ResourceKind::Photo;
    const COLUMNS: &'static [&'static str] = &[
        "description",
        "date_taken",
        "latitude",
        "longitude",
        "is_cover",
        "position",
        "trail_uuid",
        "file_id",
        "size",
    ];
    const MUTABLE_COLUMNS: &'static [&'static str] = &[
        "description",
        "date_taken",
        "latitude",
        "longitude",
        "is_cover",
        "position",
    ];

    fn column_values(&self) -> Vec<Value> {
        let mut values = self.mutable_values();
        values.extend([
            Value::Text(self.trail_uuid.clone()),
            Value::Text(self.file_id.clone()),
            Value::Integer(self.size),
        ]);
        values
    }

    fn mutable_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.description.clone()),
            optional_integer_value(self.date_taken),
            optional_real_value(self.latitude),
            optional_real_value(self.longitude),
            bool_value(self.is_cover),
            Value::Integer(self.index),
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
            description: r.text()?,
            date_taken: r.optional_integer()?,
            latitude: r.optional_real()?,
            longitude: r.optional_real()?,
            is_cover: r.boolean()?,
            index: r.integer()?,
            trail_uuid: r.text()?,
            file_id: r.text()?,
            size: r.integer()?,
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
pub struct PhotoStore;

impl ResourceStore for PhotoStore {
    type Record = Photo;
    type Dto = PhotoDto;
    type Draft = PhotoDraft;

    async fn prepare_create(
        &self,
        conn: &Connection,
        owner: &str,
        draft: PhotoDraft,
        now: i64,
    ) -> Result<Photo> {
        record::require_all::<Trail>(conn, owner, &[draft.trail_uuid.clone()]).await?;
        Ok(Photo::from_draft(owner, draft, now))
    }

    async fn prepare_update(
        &self,
        _conn: &Connection,
        stored: &Photo,
        draft: PhotoDraft,
    ) -> Result<Photo> {
        Ok(stored.with_changes(draft))
    }

    fn quota_costs(&self, record: &Photo) -> Vec<QuotaCost> {
        vec![QuotaCost::new(QuotaKind::PhotoBytes, record.size)]
    }

    async fn visible(&self, conn: &Connection, owner: &str) -> Result<Vec<Photo>> {
        let columns = record::select_columns::<Photo>(Some("p"));
        let sql = format!(
            "SELECT {columns} FROM photos p WHERE p.owner = ?
             UNION ALL
             SELECT {columns} FROM photos p
             JOIN ({shared}) st ON st.trail_id = p.trail_uuid AND st.trail_owner = p.owner",
            shared = shares::shared_trails_sql(true)
        );
        record::query_records(
            conn,
            &sql,
            vec![Value::Text(owner.to_string()), Value::Text(owner.to_string())],
        )
        .await
    }
}
