//! Tag and trail-tag link models

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::resource::Versioned;
use super::validation::{
    optional_uuid, optional_version, require_text, require_uuid, Draft, Submission,
};

const NAME_MAX_CHARS: usize = 50;

/// A label for organizing trails inside one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub owner: String,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub name: String,
    pub parent_uuid: Option<String>,
    /// Collection the tag lives in. Never changes.
    pub collection_uuid: String,
}

impl Tag {
    #[must_use]
    pub fn from_draft(owner: &str, draft: TagDraft, now: i64) -> Self {
        Self {
            id: draft.id,
            owner: owner.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
            name: draft.name,
            parent_uuid: draft.parent_uuid,
            collection_uuid: draft.collection_uuid,
        }
    }

    #[must_use]
    pub fn with_changes(&self, draft: TagDraft) -> Self {
        Self {
            name: draft.name,
            parent_uuid: draft.parent_uuid,
            ..self.clone()
        }
    }
}

impl Versioned for Tag {
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
pub struct TagDto {
    pub id: Option<String>,
    pub version: Option<i64>,
    pub name: Option<String>,
    pub parent_uuid: Option<String>,
    pub collection_uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDraft {
    pub id: String,
    pub version: Option<i64>,
    pub name: String,
    pub parent_uuid: Option<String>,
    pub collection_uuid: String,
}

impl Submission for TagDto {
    type Draft = TagDraft;

    fn submitted_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(self) -> Result<TagDraft> {
        let id = require_uuid("id", self.id.as_deref())?;
        let parent_uuid = optional_uuid("parentUuid", self.parent_uuid.as_deref())?;
        if parent_uuid.as_deref() == Some(id.as_str()) {
            return Err(Error::Invalid("parentUuid"));
        }
        Ok(TagDraft {
            version: optional_version(self.version)?,
            name: require_text("name", self.name, NAME_MAX_CHARS)?,
            parent_uuid,
            collection_uuid: require_uuid("collectionUuid", self.collection_uuid.as_deref())?,
            id,
        })
    }
}

impl Draft for TagDraft {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> Option<i64> {
        self.version
    }
}

/// Association between a tag and a trail. Unversioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailTag {
    pub tag_uuid: String,
    pub trail_uuid: String,
    pub owner: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailTagDto {
    pub tag_uuid: Option<String>,
    pub trail_uuid: Option<String>,
}

impl TrailTagDto {
    /// Normalized `(tag_uuid, trail_uuid)` pair.
    pub fn validate(&self) -> Result<(String, String)> {
        Ok((
            require_uuid("tagUuid", self.tag_uuid.as_deref())?,
            require_uuid("trailUuid", self.trail_uuid.as_deref())?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "0190a1b2-c3d4-7e5f-8a9b-0c1d2e3f4a5b";
    const COLLECTION: &str = "0190a1b2-c3d4-7e5f-8a9b-000000000001";

    #[test]
    fn tag_cannot_parent_itself() {
        let dto = TagDto {
            id: Some(ID.to_string()),
            name: Some("summits".to_string()),
            parent_uuid: Some(ID.to_uppercase()),
            collection_uuid: Some(COLLECTION.to_string()),
            ..TagDto::default()
        };
        assert!(matches!(dto.validate(), Err(Error::Invalid("parentUuid"))));
    }

    #[test]
    fn collection_is_immutable() {
        let draft = TagDto {
            id: Some(ID.to_string()),
            name: Some("summits".to_string()),
            collection_uuid: Some(COLLECTION.to_string()),
            ..TagDto::default()
        }
        .validate()
        .unwrap();
        let tag = Tag::from_draft("a@b.c", draft.clone(), 5);
        let moved = tag.with_changes(TagDraft {
            collection_uuid: "0190a1b2-c3d4-7e5f-8a9b-000000000009".to_string(),
            name: "peaks".to_string(),
            ..draft
        });
        assert_eq!(moved.collection_uuid, COLLECTION);
        assert_eq!(moved.name, "peaks");
    }

    #[test]
    fn link_requires_both_ends() {
        let dto = TrailTagDto {
            tag_uuid: Some(ID.to_string()),
            trail_uuid: None,
        };
        assert!(matches!(dto.validate(), Err(Error::Missing("trailUuid"))));
    }
}
