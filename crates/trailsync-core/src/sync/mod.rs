//! Differential sync between a client's replica and the server.
//!
//! The client sends one [`KnownMarker`] per record it holds. The server
//! streams the records the caller can currently see and classifies each:
//! unknown to the client is `created`, newer than the marker is `updated`.
//! Markers left unmatched at the end were deleted or are no longer visible.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::models::{KnownMarker, ResourceKey, SyncResult, Versioned};

/// Diff `visible` against the client's `known` markers.
///
/// `visible` may contain the same record more than once (for example a trail
/// reachable through two shares); the first occurrence wins.
pub fn compute_sync<T, I>(visible: I, known: Vec<KnownMarker>) -> Result<SyncResult<T>>
where
    T: Versioned,
    I: IntoIterator<Item = T>,
{
    let mut pending = HashMap::with_capacity(known.len());
    for marker in known {
        if pending.insert(marker.key(), marker.version).is_some() {
            return Err(Error::Invalid("known"));
        }
    }

    let diff = visible
        .into_iter()
        .fold(SyncDiff::new(pending), SyncDiff::observe);
    Ok(diff.finish())
}

struct SyncDiff<T> {
    pending: HashMap<ResourceKey, i64>,
    seen: HashSet<ResourceKey>,
    created: Vec<T>,
    updated: Vec<T>,
}

impl<T: Versioned> SyncDiff<T> {
    fn new(pending: HashMap<ResourceKey, i64>) -> Self {
        Self {
            pending,
            seen: HashSet::new(),
            created: Vec::new(),
            updated: Vec::new(),
        }
    }

    fn observe(mut self, resource: T) -> Self {
        let key = resource.key();
        if self.seen.contains(&key) {
            return self;
        }
        match self.pending.remove(&key) {
            None => self.created.push(resource),
            Some(known_version) if known_version < resource.version() => {
                self.updated.push(resource);
            }
            Some(_) => {}
        }
        self.seen.insert(key);
        self
    }

    fn finish(self) -> SyncResult<T> {
        let mut deleted: Vec<ResourceKey> = self.pending.into_keys().collect();
        deleted.sort();
        SyncResult {
            created: self.created,
            updated: self.updated,
            deleted,
        }
    }
}
