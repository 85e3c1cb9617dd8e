//! Collection store

use libsql::{Connection, Row, Value};

use crate::db::record::{self, RowReader, TableRecord};
use crate::db::QuotaLedger;
use crate::engine::ResourceStore;
use crate::error::{Error, Result};
use crate::models::{
    Collection, CollectionDraft, CollectionDto, CollectionType, QuotaCost, QuotaKind,
    ResourceKind,
};

use super::{owner_and, tags, trails};

impl TableRecord for Collection {
    const TABLE: &'static str = "collections";
    const KIND: ResourceKind = ResourceKind::Collection;
    const COLUMNS: &'static [&'static str] = &["name", "collection_type"];
    const MUTABLE_COLUMNS: &'static [&'static str] = &["name", "collection_type"];

    fn column_values(&self) -> Vec<Value> {
        self.mutable_values()
    }

    fn mutable_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            Value::Text(self.collection_type.as_str().to_string()),
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
            collection_type: r.text()?.parse()?,
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
pub struct CollectionStore;

impl ResourceStore for CollectionStore {
    type Record = Collection;
    type Dto = CollectionDto;
    type Draft = CollectionDraft;

    async fn prepare_create(
        &self,
        _conn: &Connection,
        owner: &str,
        draft: CollectionDraft,
        now: i64,
    ) -> Result<Collection> {
        if !draft.collection_type.client_creatable() {
            return Err(Error::forbidden(format!(
                "{} collections are created with the account",
                draft.collection_type
            )));
        }
        Ok(Collection::from_draft(owner, draft, now))
    }

    async fn prepare_update(
        &self,
        _conn: &Connection,
        stored: &Collection,
        draft: CollectionDraft,
    ) -> Result<Collection> {
        if !stored.collection_type.can_become(draft.collection_type) {
            return Err(Error::forbidden(format!(
                "collection type cannot change from {} to {}",
                stored.collection_type, draft.collection_type
            )));
        }
        Ok(stored.with_changes(draft))
    }

    fn quota_costs(&self, _record: &Collection) -> Vec<QuotaCost> {
        vec![QuotaCost::one(QuotaKind::Collections)]
    }

    fn deletable(&self, record: &Collection) -> bool {
        record.collection_type != CollectionType::MyTrails
    }

    async fn cascade_delete(
        &self,
        conn: &Connection,
        ledger: &QuotaLedger<'_>,
        owner: &str,
        records: &[Collection],
    ) -> Result<()> {
        let ids: Vec<String> = records.iter().map(|c| c.id.clone()).collect();

        let trail_ids = record::query_ids(
            conn,
            &format!(
                "SELECT id FROM trails WHERE owner = ? AND collection_uuid IN ({})",
                record::placeholders(ids.len())
            ),
            owner_and(owner, &ids),
        )
        .await?;
        trails::remove_trails(conn, ledger, owner, &trail_ids).await?;

        let tag_ids = record::query_ids(
            conn,
            &format!(
                "SELECT id FROM tags WHERE owner = ? AND collection_uuid IN ({})",
                record::placeholders(ids.len())
            ),
            owner_and(owner, &ids),
        )
        .await?;
        tags::remove_tags(conn, ledger, owner, &tag_ids).await
    }
}
