//! Trail model

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::resource::Versioned;
use super::validation::{
    optional_text, optional_version, require_text, require_uuid, text_or_empty, Draft, Submission,
};

const NAME_MAX_CHARS: usize = 200;
const DESCRIPTION_MAX_CHARS: usize = 50_000;
const LOCATION_MAX_CHARS: usize = 100;
const LOOP_TYPE_MAX_CHARS: usize = 2;
const ACTIVITY_MAX_CHARS: usize = 20;

/// A recorded or planned trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trail {
    pub id: String,
    pub owner: String,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub name: String,
    pub description: String,
    pub location: String,
    /// Date the trail was walked (Unix ms)
    pub date: Option<i64>,
    pub loop_type: Option<String>,
    pub activity: Option<String>,
    pub collection_uuid: String,
    /// Track recorded on the device. Never changes.
    pub original_track_uuid: String,
    /// Track after client-side edits.
    pub current_track_uuid: String,
}

impl Versioned for Trail {
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

/// Trail payload as sent by clients
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailDto {
    pub id: Option<String>,
    pub version: Option<i64>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub date: Option<i64>,
    pub loop_type: Option<String>,
    pub activity: Option<String>,
    pub collection_uuid: Option<String>,
    pub original_track_uuid: Option<String>,
    pub current_track_uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailDraft {
    pub id: String,
    pub version: Option<i64>,
    pub name: String,
    pub description: String,
    pub location: String,
    pub date: Option<i64>,
    pub loop_type: Option<String>,
    pub activity: Option<String>,
    pub collection_uuid: String,
    pub original_track_uuid: String,
    pub current_track_uuid: String,
}

impl Submission for TrailDto {
    type Draft = TrailDraft;

    fn submitted_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(self) -> Result<TrailDraft> {
        Ok(TrailDraft {
            id: require_uuid("id", self.id.as_deref())?,
            version: optional_version(self.version)?,
            name: require_text("name", self.name, NAME_MAX_CHARS)?,
            description: text_or_empty("description", self.description, DESCRIPTION_MAX_CHARS)?,
            location: text_or_empty("location", self.location, LOCATION_MAX_CHARS)?,
            date: self.date,
            loop_type: optional_text("loopType", self.loop_type, LOOP_TYPE_MAX_CHARS)?,
            activity: optional_text("activity", self.activity, ACTIVITY_MAX_CHARS)?,
            collection_uuid: require_uuid("collectionUuid", self.collection_uuid.as_deref())?,
            original_track_uuid: require_uuid(
                "originalTrackUuid",
                self.original_track_uuid.as_deref(),
            )?,
            current_track_uuid: require_uuid(
                "currentTrackUuid",
                self.current_track_uuid.as_deref(),
            )?,
        })
    }
}

impl Draft for TrailDraft {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> Option<i64> {
        self.version
    }
}

impl Trail {
    /// New version-1 trail for `owner` from a validated draft.
    #[must_use]
    pub fn from_draft(owner: &str, draft: TrailDraft, now: i64) -> Self {
        Self {
            id: draft.id,
            owner: owner.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
            name: draft.name,
            description: draft.description,
            location: draft.location,
            date: draft.date,
            loop_type: draft.loop_type,
            activity: draft.activity,
            collection_uuid: draft.collection_uuid,
            original_track_uuid: draft.original_track_uuid,
            current_track_uuid: draft.current_track_uuid,
        }
    }

    /// Copy of this trail carrying the draft's mutable fields.
    #[must_use]
    pub fn with_changes(&self, draft: TrailDraft) -> Self {
        Self {
            name: draft.name,
            description: draft.description,
            location: draft.location,
            date: draft.date,
            loop_type: draft.loop_type,
            activity: draft.activity,
            collection_uuid: draft.collection_uuid,
            current_track_uuid: draft.current_track_uuid,
            ..self.clone()
        }
    }
}

/// A submission carrying the record's current values.
impl From<&Trail> for TrailDto {
    fn from(trail: &Trail) -> Self {
        Self {
            id: Some(trail.id.clone()),
            version: Some(trail.version),
            name: Some(trail.name.clone()),
            description: Some(trail.description.clone()),
            location: Some(trail.location.clone()),
            date: trail.date,
            loop_type: trail.loop_type.clone(),
            activity: trail.activity.clone(),
            collection_uuid: Some(trail.collection_uuid.clone()),
            original_track_uuid: Some(trail.original_track_uuid.clone()),
            current_track_uuid: Some(trail.current_track_uuid.clone()),
        }
    }
}
