//! Versioned resource primitives shared by every kind

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::util::{normalize_id, normalize_owner};

/// The resource kinds clients replicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Collection,
    Trail,
    Track,
    Tag,
    TrailTag,
    Photo,
    Share,
}

impl ResourceKind {
    /// Singular label used in error codes (`trail-not-found`).
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Trail => "trail",
            Self::Track => "track",
            Self::Tag => "tag",
            Self::TrailTag => "trail-tag",
            Self::Photo => "photo",
            Self::Share => "share",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity of a record: its id plus the owning account
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub id: String,
    pub owner: String,
}

impl ResourceKey {
    /// Build a key, normalizing both halves the same way stored rows are.
    #[must_use]
    pub fn new(id: &str, owner: &str) -> Self {
        Self {
            id: normalize_id(id),
            owner: normalize_owner(owner),
        }
    }
}

/// A client's last-synced view of one record. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownMarker {
    pub id: String,
    pub owner: String,
    pub version: i64,
}

impl KnownMarker {
    #[must_use]
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.id, &self.owner)
    }
}

/// Anything carrying the version ledger fields.
pub trait Versioned {
    fn id(&self) -> &str;
    fn owner(&self) -> &str;
    fn version(&self) -> i64;

    fn key(&self) -> ResourceKey {
        ResourceKey {
            id: self.id().to_string(),
            owner: self.owner().to_string(),
        }
    }
}

/// Outcome of a differential sync. The three lists are disjoint by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult<T> {
    pub created: Vec<T>,
    pub updated: Vec<T>,
    pub deleted: Vec<ResourceKey>,
}

impl<T> SyncResult<T> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

impl<T> Default for SyncResult<T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }
}
