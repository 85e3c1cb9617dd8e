//! Row mapping shared by every versioned resource table

use std::collections::HashSet;

use libsql::{params_from_iter, Connection, Row, Value};

use crate::error::{Error, Result};
use crate::models::{ResourceKind, Versioned};

/// Metadata columns every resource table starts with, in select order.
pub const META_COLUMNS: [&str; 5] = ["id", "owner", "version", "created_at", "updated_at"];

/// Bound parameters per statement stay well below SQLite's variable limit.
const MAX_BOUND_IDS: usize = 500;

/// Maps a versioned record to its table.
pub trait TableRecord: Versioned + Clone + Send + Sync + 'static {
    const TABLE: &'static str;
    const KIND: ResourceKind;
    /// Payload columns following [`META_COLUMNS`].
    const COLUMNS: &'static [&'static str];
    /// Payload columns a conditional update rewrites.
    const MUTABLE_COLUMNS: &'static [&'static str];

    /// Values for [`Self::COLUMNS`], in order.
    fn column_values(&self) -> Vec<Value>;

    /// Values for [`Self::MUTABLE_COLUMNS`], in order.
    fn mutable_values(&self) -> Vec<Value>;

    /// Build from a row selected with [`select_columns`]. Payload starts after the metadata.
    fn from_row(row: &Row) -> Result<Self>;

    fn created_at(&self) -> i64;
    fn updated_at(&self) -> i64;

    /// Record a committed mutation.
    fn stamp(&mut self, version: i64, updated_at: i64);
}

/// Column list for `SELECT`, optionally qualified with a table alias.
pub fn select_columns<R: TableRecord>(alias: Option<&str>) -> String {
    META_COLUMNS
        .iter()
        .chain(R::COLUMNS)
        .map(|column| match alias {
            Some(alias) => format!("{alias}.{column}"),
            None => (*column).to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// `?, ?, ?` with `count` placeholders.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn all_values<R: TableRecord>(record: &R) -> Vec<Value> {
    let mut values = vec![
        Value::Text(record.id().to_string()),
        Value::Text(record.owner().to_string()),
        Value::Integer(record.version()),
        Value::Integer(record.created_at()),
        Value::Integer(record.updated_at()),
    ];
    values.extend(record.column_values());
    values
}

/// Run a query returning full records.
pub async fn query_records<R: TableRecord>(
    conn: &Connection,
    sql: &str,
    params: Vec<Value>,
) -> Result<Vec<R>> {
    let mut rows = conn.query(sql, params_from_iter(params)).await?;
    let mut records = Vec::new();
    while let Some(row) = rows.next().await? {
        records.push(R::from_row(&row)?);
    }
    Ok(records)
}

/// Run a query whose first column is text, e.g. `RETURNING id`.
pub async fn query_ids(conn: &Connection, sql: &str, params: Vec<Value>) -> Result<Vec<String>> {
    let mut rows = conn.query(sql, params_from_iter(params)).await?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next().await? {
        ids.push(row.get::<String>(0)?);
    }
    Ok(ids)
}

/// Run a query whose first column is an integer, e.g. `RETURNING size`.
pub async fn query_integers(conn: &Connection, sql: &str, params: Vec<Value>) -> Result<Vec<i64>> {
    let mut rows = conn.query(sql, params_from_iter(params)).await?;
    let mut values = Vec::new();
    while let Some(row) = rows.next().await? {
        values.push(row.get::<i64>(0)?);
    }
    Ok(values)
}

pub async fn find_one<R: TableRecord>(conn: &Connection, owner: &str, id: &str) -> Result<Option<R>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE owner = ? AND id = ?",
        select_columns::<R>(None),
        R::TABLE
    );
    let records = query_records::<R>(
        conn,
        &sql,
        vec![Value::Text(owner.to_string()), Value::Text(id.to_string())],
    )
    .await?;
    Ok(records.into_iter().next())
}

/// Like [`find_one`], failing with `<kind>-not-found` when absent.
pub async fn require_one<R: TableRecord>(conn: &Connection, owner: &str, id: &str) -> Result<R> {
    find_one(conn, owner, id)
        .await?
        .ok_or_else(|| Error::not_found(R::KIND, id))
}

/// Ids among `ids` that exist for `owner`.
pub async fn existing_ids<R: TableRecord>(
    conn: &Connection,
    owner: &str,
    ids: &[String],
) -> Result<HashSet<String>> {
    let mut found = HashSet::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_BOUND_IDS) {
        let sql = format!(
            "SELECT id FROM {} WHERE owner = ? AND id IN ({})",
            R::TABLE,
            placeholders(chunk.len())
        );
        let mut params = vec![Value::Text(owner.to_string())];
        params.extend(chunk.iter().cloned().map(Value::Text));
        found.extend(query_ids(conn, &sql, params).await?);
    }
    Ok(found)
}

/// Fail with `<kind>-not-found` for the first id in `ids` the owner lacks.
pub async fn require_all<R: TableRecord>(conn: &Connection, owner: &str, ids: &[String]) -> Result<()> {
    let found = existing_ids::<R>(conn, owner, ids).await?;
    match ids.iter().find(|id| !found.contains(*id)) {
        Some(missing) => Err(Error::not_found(R::KIND, missing.clone())),
        None => Ok(()),
    }
}

/// Owned records among `ids`. Foreign and unknown ids are skipped.
pub async fn find_by_ids<R: TableRecord>(
    conn: &Connection,
    owner: &str,
    ids: &[String],
) -> Result<Vec<R>> {
    let mut records = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_BOUND_IDS) {
        let sql = format!(
            "SELECT {} FROM {} WHERE owner = ? AND id IN ({})",
            select_columns::<R>(None),
            R::TABLE,
            placeholders(chunk.len())
        );
        let mut params = vec![Value::Text(owner.to_string())];
        params.extend(chunk.iter().cloned().map(Value::Text));
        records.extend(query_records::<R>(conn, &sql, params).await?);
    }
    Ok(records)
}

pub async fn find_by_owner<R: TableRecord>(conn: &Connection, owner: &str) -> Result<Vec<R>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE owner = ? ORDER BY created_at, id",
        select_columns::<R>(None),
        R::TABLE
    );
    query_records::<R>(conn, &sql, vec![Value::Text(owner.to_string())]).await
}

/// Insert all records with one multi-row statement.
pub async fn insert_batch<R: TableRecord>(conn: &Connection, records: &[R]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let column_count = META_COLUMNS.len() + R::COLUMNS.len();
    let row = format!("({})", placeholders(column_count));
    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        R::TABLE,
        select_columns::<R>(None),
        vec![row.as_str(); records.len()].join(", ")
    );
    let params: Vec<Value> = records.iter().flat_map(all_values).collect();
    conn.execute(&sql, params_from_iter(params)).await?;
    Ok(())
}

/// Delete owned rows among `ids`, returning the ids actually removed.
pub async fn delete_by_ids<R: TableRecord>(
    conn: &Connection,
    owner: &str,
    ids: &[String],
) -> Result<Vec<String>> {
    let mut removed = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_BOUND_IDS) {
        let sql = format!(
            "DELETE FROM {} WHERE owner = ? AND id IN ({}) RETURNING id",
            R::TABLE,
            placeholders(chunk.len())
        );
        let mut params = vec![Value::Text(owner.to_string())];
        params.extend(chunk.iter().cloned().map(Value::Text));
        removed.extend(query_ids(conn, &sql, params).await?);
    }
    Ok(removed)
}

/// Sequential column reader over a selected row.
pub struct RowReader<'a> {
    row: &'a Row,
    index: i32,
}

impl<'a> RowReader<'a> {
    pub const fn new(row: &'a Row) -> Self {
        Self { row, index: 0 }
    }

    fn next_value(&mut self) -> Result<Value> {
        let value = self.row.get_value(self.index)?;
        self.index += 1;
        Ok(value)
    }

    fn mismatch(&self, expected: &str) -> Error {
        Error::Database(format!(
            "column {} is not {expected}",
            self.row.column_name(self.index - 1).unwrap_or("?")
        ))
    }

    pub fn text(&mut self) -> Result<String> {
        self.optional_text()?.ok_or_else(|| self.mismatch("text"))
    }

    pub fn optional_text(&mut self) -> Result<Option<String>> {
        match self.next_value()? {
            Value::Null => Ok(None),
            Value::Text(text) => Ok(Some(text)),
            _ => Err(self.mismatch("text")),
        }
    }

    pub fn integer(&mut self) -> Result<i64> {
        self.optional_integer()?.ok_or_else(|| self.mismatch("an integer"))
    }

    pub fn optional_integer(&mut self) -> Result<Option<i64>> {
        match self.next_value()? {
            Value::Null => Ok(None),
            Value::Integer(value) => Ok(Some(value)),
            _ => Err(self.mismatch("an integer")),
        }
    }

    pub fn boolean(&mut self) -> Result<bool> {
        self.integer().map(|value| value != 0)
    }

    pub fn optional_real(&mut self) -> Result<Option<f64>> {
        match self.next_value()? {
            Value::Null => Ok(None),
            Value::Real(value) => Ok(Some(value)),
            #[allow(clippy::cast_precision_loss)]
            Value::Integer(value) => Ok(Some(value as f64)),
            _ => Err(self.mismatch("a number")),
        }
    }

    pub fn blob(&mut self) -> Result<Vec<u8>> {
        match self.next_value()? {
            Value::Blob(bytes) => Ok(bytes),
            _ => Err(self.mismatch("a blob")),
        }
    }
}

/// `Value::Text` or `Value::Null`.
pub fn optional_text_value(value: Option<&String>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.clone()))
}

pub fn optional_integer_value(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

pub fn optional_real_value(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::Real)
}

pub fn bool_value(value: bool) -> Value {
    Value::Integer(i64::from(value))
}
