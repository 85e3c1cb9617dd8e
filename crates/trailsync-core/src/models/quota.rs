//! Quota kinds, counters and plans

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MIB: i64 = 1024 * 1024;

/// A metered quantity tracked per owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    Collections,
    Trails,
    Tracks,
    Tags,
    Shares,
    TrackBytes,
    PhotoBytes,
}

impl QuotaKind {
    pub const ALL: [Self; 7] = [
        Self::Collections,
        Self::Trails,
        Self::Tracks,
        Self::Tags,
        Self::Shares,
        Self::TrackBytes,
        Self::PhotoBytes,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Collections => "collections",
            Self::Trails => "trails",
            Self::Tracks => "tracks",
            Self::Tags => "tags",
            Self::Shares => "shares",
            Self::TrackBytes => "track_bytes",
            Self::PhotoBytes => "photo_bytes",
        }
    }

    /// Size kinds may grant less than requested when close to the limit.
    #[must_use]
    pub const fn allows_less(self) -> bool {
        matches!(self, Self::TrackBytes | Self::PhotoBytes)
    }
}

impl fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuotaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown quota kind: {s}"))
    }
}

/// An amount of one quota kind consumed by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCost {
    pub kind: QuotaKind,
    pub amount: i64,
}

impl QuotaCost {
    #[must_use]
    pub const fn new(kind: QuotaKind, amount: i64) -> Self {
        Self { kind, amount }
    }

    /// One unit of a count kind.
    #[must_use]
    pub const fn one(kind: QuotaKind) -> Self {
        Self { kind, amount: 1 }
    }
}

/// Stored ledger row for one owner and kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCounter {
    pub owner: String,
    pub kind: QuotaKind,
    pub used: i64,
    pub max: i64,
}

impl QuotaCounter {
    #[must_use]
    pub const fn headroom(&self) -> i64 {
        let remaining = self.max - self.used;
        if remaining < 0 {
            0
        } else {
            remaining
        }
    }
}

/// Limits applied when an account is provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaPlan {
    pub collections: i64,
    pub trails: i64,
    pub tracks: i64,
    pub tags: i64,
    pub shares: i64,
    pub track_bytes: i64,
    pub photo_bytes: i64,
}

impl QuotaPlan {
    #[must_use]
    pub const fn max_for(&self, kind: QuotaKind) -> i64 {
        match kind {
            QuotaKind::Collections => self.collections,
            QuotaKind::Trails => self.trails,
            QuotaKind::Tracks => self.tracks,
            QuotaKind::Tags => self.tags,
            QuotaKind::Shares => self.shares,
            QuotaKind::TrackBytes => self.track_bytes,
            QuotaKind::PhotoBytes => self.photo_bytes,
        }
    }

    pub fn set_max(&mut self, kind: QuotaKind, max: i64) {
        let slot = match kind {
            QuotaKind::Collections => &mut self.collections,
            QuotaKind::Trails => &mut self.trails,
            QuotaKind::Tracks => &mut self.tracks,
            QuotaKind::Tags => &mut self.tags,
            QuotaKind::Shares => &mut self.shares,
            QuotaKind::TrackBytes => &mut self.track_bytes,
            QuotaKind::PhotoBytes => &mut self.photo_bytes,
        };
        *slot = max;
    }
}

impl Default for QuotaPlan {
    fn default() -> Self {
        Self {
            collections: 10,
            trails: 1000,
            tracks: 2000,
            tags: 500,
            shares: 50,
            track_bytes: 50 * MIB,
            photo_bytes: 200 * MIB,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kind_names() {
        assert_eq!("trails".parse::<QuotaKind>().unwrap(), QuotaKind::Trails);
        assert_eq!("Track-Bytes".parse::<QuotaKind>().unwrap(), QuotaKind::TrackBytes);
        assert!("notes".parse::<QuotaKind>().is_err());
    }

    #[test]
    fn only_size_kinds_allow_less() {
        let partial: Vec<_> = QuotaKind::ALL
            .into_iter()
            .filter(|kind| kind.allows_less())
            .collect();
        assert_eq!(partial, vec![QuotaKind::TrackBytes, QuotaKind::PhotoBytes]);
    }

    #[test]
    fn headroom_never_negative() {
        let counter = QuotaCounter {
            owner: "a@b.c".to_string(),
            kind: QuotaKind::Tags,
            used: 12,
            max: 10,
        };
        assert_eq!(counter.headroom(), 0);
    }

    #[test]
    fn plan_overrides() {
        let mut plan = QuotaPlan::default();
        plan.set_max(QuotaKind::Shares, 3);
        assert_eq!(plan.max_for(QuotaKind::Shares), 3);
        assert_eq!(plan.max_for(QuotaKind::TrackBytes), 50 * MIB);
    }
}
