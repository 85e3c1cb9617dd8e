//! Collection model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

use super::resource::Versioned;
use super::validation::{optional_version, require_text, require_uuid, Draft, Submission};

const NAME_MAX_CHARS: usize = 100;

/// What a collection is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionType {
    /// The account's default collection, one per owner.
    MyTrails,
    /// Bookmarks of trails the owner follows. Holds no trails itself.
    MySelection,
    Custom,
}

/// Types a client may create directly.
const CREATABLE_TYPES: &[CollectionType] = &[CollectionType::MySelection, CollectionType::Custom];

/// Allowed type changes, source to targets.
const TYPE_TRANSITIONS: &[(CollectionType, &[CollectionType])] = &[
    (CollectionType::MyTrails, &[CollectionType::MyTrails]),
    (CollectionType::MySelection, &[CollectionType::MySelection]),
    (CollectionType::Custom, &[CollectionType::Custom]),
];

/// Allowed trail moves, source collection type to target collection types.
const TRAIL_MOVES: &[(CollectionType, &[CollectionType])] = &[
    (
        CollectionType::MyTrails,
        &[CollectionType::MyTrails, CollectionType::Custom],
    ),
    (
        CollectionType::Custom,
        &[CollectionType::MyTrails, CollectionType::Custom],
    ),
    (CollectionType::MySelection, &[]),
];

fn permitted(
    table: &[(CollectionType, &[CollectionType])],
    from: CollectionType,
    to: CollectionType,
) -> bool {
    table
        .iter()
        .find(|(source, _)| *source == from)
        .is_some_and(|(_, targets)| targets.contains(&to))
}

impl CollectionType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MyTrails => "MY_TRAILS",
            Self::MySelection => "MY_SELECTION",
            Self::Custom => "CUSTOM",
        }
    }

    #[must_use]
    pub fn client_creatable(self) -> bool {
        CREATABLE_TYPES.contains(&self)
    }

    #[must_use]
    pub fn can_become(self, target: Self) -> bool {
        permitted(TYPE_TRANSITIONS, self, target)
    }

    /// Whether trails may be created inside a collection of this type.
    #[must_use]
    pub fn holds_trails(self) -> bool {
        permitted(TRAIL_MOVES, self, self)
    }

    #[must_use]
    pub fn can_move_trail_to(self, target: Self) -> bool {
        permitted(TRAIL_MOVES, self, target)
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MY_TRAILS" => Ok(Self::MyTrails),
            "MY_SELECTION" => Ok(Self::MySelection),
            "CUSTOM" => Ok(Self::Custom),
            _ => Err(Error::Invalid("type")),
        }
    }
}

/// A named group of trails and tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub owner: String,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub collection_type: CollectionType,
}

impl Collection {
    #[must_use]
    pub fn from_draft(owner: &str, draft: CollectionDraft, now: i64) -> Self {
        Self {
            id: draft.id,
            owner: owner.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
            name: draft.name,
            collection_type: draft.collection_type,
        }
    }

    #[must_use]
    pub fn with_changes(&self, draft: CollectionDraft) -> Self {
        Self {
            name: draft.name,
            collection_type: draft.collection_type,
            ..self.clone()
        }
    }
}

impl Versioned for Collection {
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

/// Collection payload as sent by clients
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDto {
    pub id: Option<String>,
    pub version: Option<i64>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub collection_type: Option<CollectionType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDraft {
    pub id: String,
    pub version: Option<i64>,
    pub name: String,
    pub collection_type: CollectionType,
}

impl Submission for CollectionDto {
    type Draft = CollectionDraft;

    fn submitted_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(self) -> Result<CollectionDraft> {
        Ok(CollectionDraft {
            id: require_uuid("id", self.id.as_deref())?,
            version: optional_version(self.version)?,
            name: require_text("name", self.name, NAME_MAX_CHARS)?,
            collection_type: self.collection_type.ok_or(Error::Missing("type"))?,
        })
    }
}

impl Draft for CollectionDraft {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> Option<i64> {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_collection_is_not_client_creatable() {
        assert!(!CollectionType::MyTrails.client_creatable());
        assert!(CollectionType::Custom.client_creatable());
        assert!(CollectionType::MySelection.client_creatable());
    }

    #[test]
    fn type_changes_are_locked() {
        assert!(CollectionType::Custom.can_become(CollectionType::Custom));
        assert!(!CollectionType::Custom.can_become(CollectionType::MyTrails));
        assert!(!CollectionType::MySelection.can_become(CollectionType::Custom));
    }

    #[test]
    fn trails_move_between_trail_holding_types() {
        assert!(CollectionType::MyTrails.can_move_trail_to(CollectionType::Custom));
        assert!(CollectionType::Custom.can_move_trail_to(CollectionType::MyTrails));
        assert!(!CollectionType::Custom.can_move_trail_to(CollectionType::MySelection));
        assert!(!CollectionType::MySelection.holds_trails());
        assert!(CollectionType::MyTrails.holds_trails());
    }

    #[test]
    fn dto_parses_wire_names() {
        let dto: CollectionDto = serde_json::from_str(
            r#"{"id":"0190A1B2-C3D4-7E5F-8A9B-0C1D2E3F4A5B","name":" Alps ","type":"CUSTOM"}"#,
        )
        .unwrap();
        let draft = dto.validate().unwrap();
        assert_eq!(draft.id, "0190a1b2-c3d4-7e5f-8a9b-0c1d2e3f4a5b");
        assert_eq!(draft.name, "Alps");
        assert_eq!(draft.collection_type, CollectionType::Custom);
        assert_eq!(draft.version, None);
    }

    #[test]
    fn dto_requires_type() {
        let dto = CollectionDto {
            id: Some("0190a1b2-c3d4-7e5f-8a9b-0c1d2e3f4a5b".to_string()),
            name: Some("Alps".to_string()),
            ..CollectionDto::default()
        };
        assert!(matches!(dto.validate(), Err(Error::Missing("type"))));
    }
}
