//! Photo metadata model
//!
//! Image bytes live in object storage. The record carries the storage
//! reference and the size metered against `photo_bytes`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::resource::Versioned;
use super::validation::{
    optional_version, require_text, require_uuid, text_or_empty, Draft, Submission,
};

pub const PHOTO_MAX_BYTES: i64 = 20 * 1024 * 1024;
const FILE_ID_MAX_CHARS: usize = 200;
const DESCRIPTION_MAX_CHARS: usize = 5_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,
    pub owner: String,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub trail_uuid: String,
    pub file_id: String,
    pub size: i64,
    pub description: String,
    pub date_taken: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_cover: bool,
    /// Position in the trail's gallery.
    pub index: i64,
}

impl Photo {
    #[must_use]
    pub fn from_draft(owner: &str, draft: PhotoDraft, now: i64) -> Self {
        Self {
            id: draft.id,
            owner: owner.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
            trail_uuid: draft.trail_uuid,
            file_id: draft.file_id,
            size: draft.size,
            description: draft.description,
            date_taken: draft.date_taken,
            latitude: draft.latitude,
            longitude: draft.longitude,
            is_cover: draft.is_cover,
            index: draft.index,
        }
    }

    /// Storage reference, size and trail are fixed at upload.
    #[must_use]
    pub fn with_changes(&self, draft: PhotoDraft) -> Self {
        Self {
            description: draft.description,
            date_taken: draft.date_taken,
            latitude: draft.latitude,
            longitude: draft.longitude,
            is_cover: draft.is_cover,
            index: draft.index,
            ..self.clone()
        }
    }
}

impl Versioned for Photo {
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

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoDto {
    pub id: Option<String>,
    pub version: Option<i64>,
    pub trail_uuid: Option<String>,
    pub file_id: Option<String>,
    pub size: Option<i64>,
    pub description: Option<String>,
    pub date_taken: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_cover: Option<bool>,
    pub index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhotoDraft {
    pub id: String,
    pub version: Option<i64>,
    pub trail_uuid: String,
    pub file_id: String,
    pub size: i64,
    pub description: String,
    pub date_taken: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_cover: bool,
    pub index: i64,
}

fn coordinate(field: &'static str, value: Option<f64>, limit: f64) -> Result<Option<f64>> {
    match value {
        Some(value) if !value.is_finite() || value.abs() > limit => Err(Error::Invalid(field)),
        other => Ok(other),
    }
}

impl Submission for PhotoDto {
    type Draft = PhotoDraft;

    fn submitted_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(self) -> Result<PhotoDraft> {
        let size = self.size.ok_or(Error::Missing("size"))?;
        if size <= 0 || size > PHOTO_MAX_BYTES {
            return Err(Error::Invalid("size"));
        }
        let index = self.index.unwrap_or(0);
        if index < 0 {
            return Err(Error::Invalid("index"));
        }
        Ok(PhotoDraft {
            id: require_uuid("id", self.id.as_deref())?,
            version: optional_version(self.version)?,
            trail_uuid: require_uuid("trailUuid", self.trail_uuid.as_deref())?,
            file_id: require_text("fileId", self.file_id, FILE_ID_MAX_CHARS)?,
            size,
            description: text_or_empty("description", self.description, DESCRIPTION_MAX_CHARS)?,
            date_taken: self.date_taken,
            latitude: coordinate("latitude", self.latitude, 90.0)?,
            longitude: coordinate("longitude", self.longitude, 180.0)?,
            is_cover: self.is_cover.unwrap_or(false),
            index,
        })
    }
}

impl Draft for PhotoDraft {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> Option<i64> {
        self.version
    }
}
