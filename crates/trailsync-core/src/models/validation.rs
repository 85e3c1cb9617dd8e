//! Field validation shared by every submission type

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::normalize_text_option;

/// A client payload that can be checked into a [`Draft`].
pub trait Submission: Clone + Send + Sync + 'static {
    type Draft: Draft;

    /// The id as submitted, for per-item error reports.
    fn submitted_id(&self) -> Option<&str>;

    /// Check field presence and shape. No storage access.
    fn validate(self) -> Result<Self::Draft>;
}

/// A validated submission.
pub trait Draft: Send + Sync + 'static {
    /// Normalized record id.
    fn id(&self) -> &str;

    /// The version the client last saw, when it sent one.
    fn version(&self) -> Option<i64>;
}

/// Parse a required UUID and return its lowercase hyphenated form.
pub fn require_uuid(field: &'static str, value: Option<&str>) -> Result<String> {
    let value = value.map(str::trim).filter(|v| !v.is_empty());
    let value = value.ok_or(Error::Missing(field))?;
    Uuid::parse_str(value)
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|_| Error::Invalid(field))
}

pub fn optional_uuid(field: &'static str, value: Option<&str>) -> Result<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => require_uuid(field, Some(value)).map(Some),
        None => Ok(None),
    }
}

/// Trimmed, non-empty text of at most `max_chars` characters.
pub fn require_text(field: &'static str, value: Option<String>, max_chars: usize) -> Result<String> {
    let value = normalize_text_option(value).ok_or(Error::Missing(field))?;
    check_length(field, value, max_chars)
}

/// Trimmed text that may be empty. Absent becomes the empty string.
pub fn text_or_empty(field: &'static str, value: Option<String>, max_chars: usize) -> Result<String> {
    let value = normalize_text_option(value).unwrap_or_default();
    check_length(field, value, max_chars)
}

pub fn optional_text(
    field: &'static str,
    value: Option<String>,
    max_chars: usize,
) -> Result<Option<String>> {
    normalize_text_option(value)
        .map(|value| check_length(field, value, max_chars))
        .transpose()
}

/// Versions presented by clients start at 1.
pub fn optional_version(value: Option<i64>) -> Result<Option<i64>> {
    match value {
        Some(version) if version < 1 => Err(Error::Invalid("version")),
        other => Ok(other),
    }
}

fn check_length(field: &'static str, value: String, max_chars: usize) -> Result<String> {
    if value.chars().count() > max_chars {
        return Err(Error::Invalid(field));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_is_normalized() {
        let id = require_uuid("id", Some(" 0190A1B2-C3D4-7E5F-8A9B-0C1D2E3F4A5B ")).unwrap();
        assert_eq!(id, "0190a1b2-c3d4-7e5f-8a9b-0c1d2e3f4a5b");
    }

    #[test]
    fn uuid_missing_and_invalid() {
        assert!(matches!(require_uuid("id", None), Err(Error::Missing("id"))));
        assert!(matches!(require_uuid("id", Some("  ")), Err(Error::Missing("id"))));
        assert!(matches!(
            require_uuid("collectionUuid", Some("not-a-uuid")),
            Err(Error::Invalid("collectionUuid"))
        ));
    }

    #[test]
    fn optional_uuid_treats_blank_as_absent() {
        assert_eq!(optional_uuid("parentUuid", Some("")).unwrap(), None);
    }

    #[test]
    fn text_limits_count_characters() {
        assert_eq!(require_text("name", Some(" é ".repeat(3)), 7).unwrap(), "é  é  é");
        assert!(matches!(
            require_text("name", Some("abcdef".to_string()), 5),
            Err(Error::Invalid("name"))
        ));
        assert!(matches!(
            require_text("name", Some("   ".to_string()), 5),
            Err(Error::Missing("name"))
        ));
        assert_eq!(text_or_empty("description", None, 10).unwrap(), "");
    }

    #[test]
    fn versions_start_at_one() {
        assert!(matches!(optional_version(Some(0)), Err(Error::Invalid("version"))));
        assert_eq!(optional_version(Some(4)).unwrap(), Some(4));
        assert_eq!(optional_version(None).unwrap(), None);
    }
}
