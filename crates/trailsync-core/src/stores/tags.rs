//! Tag store

use libsql::{Connection, Row, Value};

use crate::db::record::{self, optional_text_value, RowReader, TableRecord};
use crate::db::QuotaLedger;
use crate::engine::ResourceStore;
use crate::error::Result;
use crate::models::{
    Collection, QuotaCost, QuotaKind, ResourceKind, Tag, TagDraft, TagDto,
};

use super::owner_and;

impl TableRecord for Tag {
    const TABLE: &'static str = "tags";
    const KIND: ResourceKind = ResourceKind::Tag;
    const COLUMNS: &'static [&'static str] = &["name", "parent_uuid", "collection_uuid"];
    const MUTABLE_COLUMNS: &'static [&'static str] = &["name", "parent_uuid"];

    fn column_values(&self) -> Vec<Value> {
        let mut values = self.mutable_values();
        values.push(Value::Text(self.collection_uuid.clone()));
        values
    }

    fn mutable_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            optional_text_value(self.parent_uuid.as_ref()),
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
            parent_uuid: r.optional_text()?,
            collection_uuid: r.text()?,
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
pub struct TagStore;

impl ResourceStore for TagStore {
    type Record = Tag;
    type Dto = TagDto;
    type Draft = TagDraft;

    async fn prepare_create(
        &self,
        conn: &Connection,
        owner: &str,
        draft: TagDraft,
        now: i64,
    ) -> Result<Tag> {
        record::require_all::<Collection>(conn, owner, &[draft.collection_uuid.clone()]).await?;
        Ok(Tag::from_draft(owner, draft, now))
    }

    async fn prepare_update(
        &self,
        _conn: &Connection,
        stored: &Tag,
        draft: TagDraft,
    ) -> Result<Tag> {
        Ok(stored.with_changes(draft))
    }

    fn quota_costs(&self, _record: &Tag) -> Vec<QuotaCost> {
        vec![QuotaCost::one(QuotaKind::Tags)]
    }

    async fn cascade_delete(
        &self,
        conn: &Connection,
        _ledger: &QuotaLedger<'_>,
        owner: &str,
        records: &[Tag],
    ) -> Result<()> {
        let ids: Vec<String> = records.iter().map(|tag| tag.id.clone()).collect();
        remove_links(conn, owner, "tag_uuid", &ids).await
    }
}

/// Delete trail-tag links whose `column` (`tag_uuid` or `trail_uuid`) is among `ids`.
pub(crate) async fn remove_links(
    conn: &Connection,
    owner: &str,
    column: &str,
    ids: &[String],
) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let removed = conn
        .execute(
            &format!(
                "DELETE FROM trail_tags WHERE owner = ? AND {column} IN ({})",
                record::placeholders(ids.len())
            ),
            libsql::params_from_iter(owner_and(owner, ids)),
        )
        .await?;
    tracing::debug!(column, removed, "Removed trail tag links");
    Ok(())
}

/// Delete tags with their links, releasing tag quota.
pub(crate) async fn remove_tags(
    conn: &Connection,
    ledger: &QuotaLedger<'_>,
    owner: &str,
    tag_ids: &[String],
) -> Result<()> {
    if tag_ids.is_empty() {
        return Ok(());
    }
    remove_links(conn, owner, "tag_uuid", tag_ids).await?;
    let removed = record::delete_by_ids::<Tag>(conn, owner, tag_ids).await?;
    let removed = i64::try_from(removed.len()).unwrap_or(i64::MAX);
    ledger.decrement(owner, QuotaKind::Tags, removed).await
}
