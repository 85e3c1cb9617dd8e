//! Share store and the visibility it grants recipients

use libsql::{Connection, Row, Value};

use crate::db::record::{self, bool_value, RowReader, TableRecord};
use crate::engine::ResourceStore;
use crate::error::{Error, Result};
use crate::models::{
    Collection, QuotaCost, QuotaKind, ResourceKind, Share, ShareDraft, ShareDto, ShareElementType,
    Tag, Trail,
};

fn json_list(items: &[String]) -> Value {
    Value::Text(serde_json::Value::from(items.to_vec()).to_string())
}

impl TableRecord for Share {
    const TABLE: &'static str = "shares";
    const KIND: ResourceKind = ResourceKind::Share;
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "recipients",
        "include_photos",
        "element_type",
        "elements",
    ];
    const MUTABLE_COLUMNS: &'static [&'static str] = &["name", "recipients", "include_photos"];

    fn column_values(&self) -> Vec<Value> {
        let mut values = self.mutable_values();
        values.push(Value::Text(self.element_type.as_str().to_string()));
        values.push(json_list(&self.elements));
        values
    }

    fn mutable_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            json_list(&self.recipients),
            bool_value(self.include_photos),
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
            recipients: serde_json::from_str(&r.text()?)?,
            include_photos: r.boolean()?,
            element_type: r.text()?.parse()?,
            elements: serde_json::from_str(&r.text()?)?,
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

/// Subquery listing trails shared with the account bound to its single `?`.
///
/// Columns: `trail_id`, `trail_owner`, `original_track_uuid`,
/// `current_track_uuid`. A trail reached through several shares is listed
/// once per share.
pub(crate) fn shared_trails_sql(photos_only: bool) -> String {
    let photos = if photos_only {
        " AND s.include_photos = 1"
    } else {
        ""
    };
    format!(
        "SELECT t.id AS trail_id, t.owner AS trail_owner,
                t.original_track_uuid AS original_track_uuid,
                t.current_track_uuid AS current_track_uuid
         FROM shares s
         JOIN json_each(s.recipients) r
         JOIN json_each(s.elements) e
         JOIN trails t ON t.owner = s.owner AND (
                (s.element_type = 'TRAIL' AND t.id = e.value)
             OR (s.element_type = 'COLLECTION' AND t.collection_uuid = e.value)
             OR (s.element_type = 'TAG' AND EXISTS (
                    SELECT 1 FROM trail_tags l
                    WHERE l.owner = s.owner AND l.tag_uuid = e.value AND l.trail_uuid = t.id
                ))
         )
         WHERE r.value = ?{photos}"
    )
}

async fn require_elements(
    conn: &Connection,
    owner: &str,
    element_type: ShareElementType,
    elements: &[String],
) -> Result<()> {
    match element_type {
        ShareElementType::Collection => {
            record::require_all::<Collection>(conn, owner, elements).await
        }
        ShareElementType::Tag => record::require_all::<Tag>(conn, owner, elements).await,
        ShareElementType::Trail => record::require_all::<Trail>(conn, owner, elements).await,
    }
}

fn check_recipients(owner: &str, recipients: &[String]) -> Result<()> {
    if recipients.iter().any(|recipient| recipient == owner) {
        return Err(Error::Invalid("recipients"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShareStore;

impl ResourceStore for ShareStore {
    type Record = Share;
    type Dto = ShareDto;
    type Draft = ShareDraft;

    async fn prepare_create(
        &self,
        conn: &Connection,
        owner: &str,
        draft: ShareDraft,
        now: i64,
    ) -> Result<Share> {
        check_recipients(owner, &draft.recipients)?;
        require_elements(conn, owner, draft.element_type, &draft.elements).await?;
        Ok(Share::from_draft(owner, draft, now))
    }

    async fn prepare_update(
        &self,
        _conn: &Connection,
        stored: &Share,
        draft: ShareDraft,
    ) -> Result<Share> {
        check_recipients(&stored.owner, &draft.recipients)?;
        Ok(stored.with_changes(draft))
    }

    fn quota_costs(&self, _record: &Share) -> Vec<QuotaCost> {
        vec![QuotaCost::one(QuotaKind::Shares)]
    }

    async fn visible(&self, conn: &Connection, owner: &str) -> Result<Vec<Share>> {
        let columns = record::select_columns::<Share>(Some("s"));
        let sql = format!(
            "SELECT {columns} FROM shares s WHERE s.owner = ?
             UNION ALL
             SELECT {columns} FROM shares s
             WHERE EXISTS (SELECT 1 FROM json_each(s.recipients) r WHERE r.value = ?)"
        );
        record::query_records(
            conn,
            &sql,
            vec![Value::Text(owner.to_string()), Value::Text(owner.to_string())],
        )
        .await
    }
}
