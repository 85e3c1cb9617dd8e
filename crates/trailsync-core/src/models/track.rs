//! Track model
//!
//! Track payloads are encoded point lists produced by clients. The server
//! treats them as opaque bytes and only meters their size.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::resource::Versioned;
use super::validation::{optional_version, require_uuid, Draft, Submission};

/// Largest accepted payload, in bytes.
pub const TRACK_MAX_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub owner: String,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Track {
    #[must_use]
    pub fn from_draft(owner: &str, draft: TrackDraft, now: i64) -> Self {
        Self {
            id: draft.id,
            owner: owner.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
            data: draft.data,
        }
    }

    #[must_use]
    pub fn with_changes(&self, draft: TrackDraft) -> Self {
        Self {
            data: draft.data,
            ..self.clone()
        }
    }

    /// Payload size in bytes, as metered against `track_bytes`.
    #[must_use]
    pub fn size(&self) -> i64 {
        i64::try_from(self.data.len()).unwrap_or(i64::MAX)
    }
}

impl Versioned for Track {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn version(&self) -> i64 {
        self.version
    }
}

/// Track payload as sent by clients. `data` is base64.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDto {
    pub id: Option<String>,
    pub version: Option<i64>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDraft {
    pub id: String,
    pub version: Option<i64>,
    pub data: Vec<u8>,
}

impl Submission for TrackDto {
    type Draft = TrackDraft;

    fn submitted_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(self) -> Result<TrackDraft> {
        let id = require_uuid("id", self.id.as_deref())?;
        let version = optional_version(self.version)?;
        let encoded = self.data.ok_or(Error::Missing("data"))?;
        let data = STANDARD
            .decode(encoded.trim())
            .map_err(|_| Error::Invalid("data"))?;
        if data.is_empty() {
            return Err(Error::Missing("data"));
        }
        if data.len() > TRACK_MAX_BYTES {
            return Err(Error::Invalid("data"));
        }
        Ok(TrackDraft { id, version, data })
    }
}

impl Draft for TrackDraft {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> Option<i64> {
        self.version
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
