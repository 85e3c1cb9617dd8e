//! Share model

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{Error, Result};

use super::resource::{ResourceKind, Versioned};
use super::validation::{optional_version, require_text, require_uuid, Draft, Submission};

const NAME_MAX_CHARS: usize = 50;
const MAX_ELEMENTS: usize = 500;
const MAX_RECIPIENTS: usize = 20;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid regex")
});

/// What the elements of a share point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShareElementType {
    Collection,
    Tag,
    Trail,
}

impl ShareElementType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Collection => "COLLECTION",
            Self::Tag => "TAG",
            Self::Trail => "TRAIL",
        }
    }

    #[must_use]
    pub const fn resource_kind(self) -> ResourceKind {
        match self {
            Self::Collection => ResourceKind::Collection,
            Self::Tag => ResourceKind::Tag,
            Self::Trail => ResourceKind::Trail,
        }
    }
}

impl fmt::Display for ShareElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShareElementType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "COLLECTION" => Ok(Self::Collection),
            "TAG" => Ok(Self::Tag),
            "TRAIL" => Ok(Self::Trail),
            _ => Err(Error::Invalid("elementType")),
        }
    }
}

/// Read access granted by an owner to a list of recipients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub id: String,
    pub owner: String,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub name: String,
    pub element_type: ShareElementType,
    /// Shared element ids. Fixed at creation.
    pub elements: Vec<String>,
    /// Lowercased e-mail addresses, sorted.
    pub recipients: Vec<String>,
    pub include_photos: bool,
}

impl Share {
    #[must_use]
    pub fn from_draft(owner: &str, draft: ShareDraft, now: i64) -> Self {
        Self {
            id: draft.id,
            owner: owner.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
            name: draft.name,
            element_type: draft.element_type,
            elements: draft.elements,
            recipients: draft.recipients,
            include_photos: draft.include_photos,
        }
    }

    #[must_use]
    pub fn with_changes(&self, draft: ShareDraft) -> Self {
        Self {
            name: draft.name,
            recipients: draft.recipients,
            include_photos: draft.include_photos,
            ..self.clone()
        }
    }
}

impl Versioned for Share {
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
pub struct ShareDto {
    pub id: Option<String>,
    pub version: Option<i64>,
    pub name: Option<String>,
    pub element_type: Option<ShareElementType>,
    pub elements: Option<Vec<String>>,
    pub recipients: Option<Vec<String>>,
    pub include_photos: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareDraft {
    pub id: String,
    pub version: Option<i64>,
    pub name: String,
    pub element_type: ShareElementType,
    pub elements: Vec<String>,
    pub recipients: Vec<String>,
    pub include_photos: bool,
}

fn validate_elements(elements: Option<Vec<String>>) -> Result<Vec<String>> {
    let elements = elements.filter(|e| !e.is_empty()).ok_or(Error::Missing("elements"))?;
    if elements.len() > MAX_ELEMENTS {
        return Err(Error::Invalid("elements"));
    }
    let unique = elements
        .iter()
        .map(|element| {
            require_uuid("elements", Some(element)).map_err(|_| Error::Invalid("elements"))
        })
        .collect::<Result<BTreeSet<_>>>()?;
    Ok(unique.into_iter().collect())
}

fn validate_recipients(recipients: Option<Vec<String>>) -> Result<Vec<String>> {
    let recipients = recipients
        .filter(|r| !r.is_empty())
        .ok_or(Error::Missing("recipients"))?;
    let unique: BTreeSet<String> = recipients
        .iter()
        .map(|recipient| recipient.trim().to_lowercase())
        .collect();
    if unique.len() > MAX_RECIPIENTS || !unique.iter().all(|r| EMAIL.is_match(r)) {
        return Err(Error::Invalid("recipients"));
    }
    Ok(unique.into_iter().collect())
}

impl Submission for ShareDto {
    type Draft = ShareDraft;

    fn submitted_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(self) -> Result<ShareDraft> {
        Ok(ShareDraft {
            id: require_uuid("id", self.id.as_deref())?,
            version: optional_version(self.version)?,
            name: require_text("name", self.name, NAME_MAX_CHARS)?,
            element_type: self.element_type.ok_or(Error::Missing("elementType"))?,
            elements: validate_elements(self.elements)?,
            recipients: validate_recipients(self.recipients)?,
            include_photos: self.include_photos.unwrap_or(false),
        })
    }
}

impl Draft for ShareDraft {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> Option<i64> {
        self.version
    }
}
