//! Trail-tag links
//!
//! Links carry no version, so they bypass the bulk engine: creation is an
//! `INSERT OR IGNORE`, deletion is silent and clients list them in full.

use std::collections::{HashMap, HashSet};

use libsql::{params, params_from_iter, Connection, Value};

use crate::db::record::{self, RowReader};
use crate::engine::{BulkCreated, ItemError};
use crate::error::{Error, Result};
use crate::models::{ResourceKind, Tag, Trail, TrailTag, TrailTagDto};
use crate::util::{normalize_owner, now_millis, owner_fingerprint};

const MAX_PAIRS_PER_STATEMENT: usize = 250;

fn pair_values(owner: &str, pairs: &[(String, String)]) -> (String, Vec<Value>) {
    let rows = vec!["(?, ?)"; pairs.len()].join(", ");
    let mut values = vec![Value::Text(owner.to_string())];
    for (tag, trail) in pairs {
        values.push(Value::Text(tag.clone()));
        values.push(Value::Text(trail.clone()));
    }
    (rows, values)
}

pub struct TrailTagStore<'a> {
    conn: &'a Connection,
}

impl<'a> TrailTagStore<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Link tags to trails. Existing links come back unchanged.
    ///
    /// Both ends must exist for the owner and belong to the same collection.
    pub async fn bulk_create(
        &self,
        owner: &str,
        dtos: Vec<TrailTagDto>,
    ) -> Result<BulkCreated<TrailTag>> {
        let owner = normalize_owner(owner);
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        let mut pairs = Vec::with_capacity(dtos.len());
        for dto in &dtos {
            match dto.validate() {
                Ok(pair) => {
                    if seen.insert(pair.clone()) {
                        pairs.push(pair);
                    }
                }
                Err(error) => errors.push(ItemError {
                    id: dto.tag_uuid.clone(),
                    error,
                }),
            }
        }

        let tag_ids: Vec<String> = pairs.iter().map(|(tag, _)| tag.clone()).collect();
        let trail_ids: Vec<String> = pairs.iter().map(|(_, trail)| trail.clone()).collect();
        let tags: HashMap<String, String> = record::find_by_ids::<Tag>(self.conn, &owner, &tag_ids)
            .await?
            .into_iter()
            .map(|tag| (tag.id, tag.collection_uuid))
            .collect();
        let trails: HashMap<String, String> =
            record::find_by_ids::<Trail>(self.conn, &owner, &trail_ids)
                .await?
                .into_iter()
                .map(|trail| (trail.id, trail.collection_uuid))
                .collect();

        let mut linkable = Vec::with_capacity(pairs.len());
        for (tag, trail) in pairs {
            let checked = match (tags.get(&tag), trails.get(&trail)) {
                (None, _) => Err(Error::not_found(ResourceKind::Tag, tag.clone())),
                (_, None) => Err(Error::not_found(ResourceKind::Trail, trail.clone())),
                (Some(tag_collection), Some(trail_collection))
                    if tag_collection != trail_collection =>
                {
                    Err(Error::forbidden("tag and trail belong to different collections"))
                }
                _ => Ok(()),
            };
            match checked {
                Ok(()) => linkable.push((tag, trail)),
                Err(error) => errors.push(ItemError {
                    id: Some(tag),
                    error,
                }),
            }
        }

        let now = now_millis();
        let mut records = Vec::with_capacity(linkable.len());
        for chunk in linkable.chunks(MAX_PAIRS_PER_STATEMENT) {
            for (tag, trail) in chunk {
                self.conn
                    .execute(
                        "INSERT OR IGNORE INTO trail_tags (tag_uuid, trail_uuid, owner, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![tag.as_str(), trail.as_str(), owner.as_str(), now],
                    )
                    .await?;
            }
            records.extend(self.find_pairs(&owner, chunk).await?);
        }

        tracing::info!(
            owner = %owner_fingerprint(&owner),
            submitted = dtos.len(),
            linked = records.len(),
            errors = errors.len(),
            "Trail tag links created"
        );

        if records.is_empty() && !errors.is_empty() {
            return Err(errors.swap_remove(0).error);
        }
        Ok(BulkCreated { records, errors })
    }

    /// Remove owned links. Invalid and unknown pairs are ignored.
    pub async fn bulk_delete(&self, owner: &str, dtos: Vec<TrailTagDto>) -> Result<u64> {
        let owner = normalize_owner(owner);
        let pairs: Vec<(String, String)> = dtos
            .iter()
            .filter_map(|dto| dto.validate().ok())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let mut removed = 0;
        for chunk in pairs.chunks(MAX_PAIRS_PER_STATEMENT) {
            let (rows, values) = pair_values(&owner, chunk);
            removed += self
                .conn
                .execute(
                    &format!(
                        "DELETE FROM trail_tags
                         WHERE owner = ? AND (tag_uuid, trail_uuid) IN (VALUES {rows})"
                    ),
                    params_from_iter(values),
                )
                .await?;
        }
        tracing::info!(owner = %owner_fingerprint(&owner), removed, "Trail tag links deleted");
        Ok(removed)
    }

    /// Every link the owner holds.
    pub async fn list(&self, owner: &str) -> Result<Vec<TrailTag>> {
        let owner = normalize_owner(owner);
        let mut rows = self
            .conn
            .query(
                "SELECT tag_uuid, trail_uuid, owner, created_at FROM trail_tags
                 WHERE owner = ?1 ORDER BY created_at, tag_uuid, trail_uuid",
                params![owner.as_str()],
            )
            .await?;
        let mut links = Vec::new();
        while let Some(row) = rows.next().await? {
            links.push(read_link(&row)?);
        }
        Ok(links)
    }

    async fn find_pairs(&self, owner: &str, pairs: &[(String, String)]) -> Result<Vec<TrailTag>> {
        let (rows, values) = pair_values(owner, pairs);
        let mut result = self
            .conn
            .query(
                &format!(
                    "SELECT tag_uuid, trail_uuid, owner, created_at FROM trail_tags
                     WHERE owner = ? AND (tag_uuid, trail_uuid) IN (VALUES {rows})"
                ),
                params_from_iter(values),
            )
            .await?;
        let mut links = Vec::with_capacity(pairs.len());
        while let Some(row) = result.next().await? {
            links.push(read_link(&row)?);
        }
        Ok(links)
    }
}

fn read_link(row: &libsql::Row) -> Result<TrailTag> {
    let mut r = RowReader::new(row);
    Ok(TrailTag {
        tag_uuid: r.text()?,
        trail_uuid: r.text()?,
        owner: r.text()?,
        created_at: r.integer()?,
    })
}
