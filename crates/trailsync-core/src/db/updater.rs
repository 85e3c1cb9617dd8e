//! Optimistic compare-and-set updates

use libsql::{params_from_iter, Connection, Value};

use crate::error::Result;

use super::record::TableRecord;

/// Write `record`'s mutable columns if the stored row still has `expected_version`.
///
/// Bumps the version to `expected_version + 1` and sets `updated_at` to `now`
/// in the same statement. Returns the number of rows written: 1 on success,
/// 0 when the row changed or disappeared since it was read.
pub async fn conditional_update<R: TableRecord>(
    conn: &Connection,
    record: &R,
    expected_version: i64,
    now: i64,
) -> Result<u64> {
    let assignments: Vec<String> = R::MUTABLE_COLUMNS
        .iter()
        .map(|column| format!("{column} = ?"))
        .chain(["version = ?".to_string(), "updated_at = ?".to_string()])
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ? AND owner = ? AND version = ?",
        R::TABLE,
        assignments.join(", ")
    );

    let mut params = record.mutable_values();
    params.extend([
        Value::Integer(expected_version + 1),
        Value::Integer(now),
        Value::Text(record.id().to_string()),
        Value::Text(record.owner().to_string()),
        Value::Integer(expected_version),
    ]);

    let applied = conn.execute(&sql, params_from_iter(params)).await?;
    Ok(applied)
}

/// Whether any mutable column of `candidate` differs from `stored`.
pub fn has_changes<R: TableRecord>(stored: &R, candidate: &R) -> bool {
    stored
        .mutable_values()
        .iter()
        .zip(candidate.mutable_values().iter())
        .any(|(before, after)| !same_value(before, after))
}

fn same_value(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Integer(a), Value::Integer(b)) => a == b,
        (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Blob(a), Value::Blob(b)) => a == b,
        _ => false,
    }
}
