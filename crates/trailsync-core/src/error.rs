//! Error types for trailsync-core

use thiserror::Error;

use crate::models::{QuotaKind, ResourceKind};

/// Result type alias using trailsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in trailsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A required input field was absent or empty
    #[error("Missing field: {0}")]
    Missing(&'static str),

    /// An input field was present but malformed
    #[error("Invalid field: {0}")]
    Invalid(&'static str),

    /// A referenced resource does not exist for the caller
    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    /// The caller may not perform the requested mutation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A plan limit has been reached
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(QuotaKind),

    /// The submitted version no longer matches the stored one
    #[error("Version conflict on {kind} {id}")]
    Conflict { kind: ResourceKind, id: String },

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Message fragments of storage failures that are worth retrying.
const TRANSIENT_MARKERS: [&str; 9] = [
    "database is locked",
    "database table is locked",
    "busy",
    "connection reset",
    "connection refused",
    "connection closed",
    "broken pipe",
    "timed out",
    "stream closed",
];

impl Error {
    /// Stable machine-readable code, independent of any transport.
    pub fn code(&self) -> String {
        match self {
            Self::Missing(field) => format!("missing-{field}"),
            Self::Invalid(field) => format!("invalid-{field}"),
            Self::NotFound { kind, .. } => format!("{kind}-not-found"),
            Self::Forbidden(_) => "forbidden".to_string(),
            Self::QuotaExceeded(kind) => format!("quota-exceeded-{}", kind.as_str()),
            Self::Conflict { .. } => "conflict".to_string(),
            Self::Database(_) | Self::LibSql(_) | Self::Serialization(_) => {
                if self.is_transient() {
                    "storage-unavailable".to_string()
                } else {
                    "storage-error".to_string()
                }
            }
        }
    }

    /// HTTP-equivalent status class.
    pub fn status(&self) -> u16 {
        match self {
            Self::Missing(_) | Self::Invalid(_) => 400,
            Self::Forbidden(_) | Self::QuotaExceeded(_) => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::Database(_) | Self::LibSql(_) | Self::Serialization(_) => {
                if self.is_transient() {
                    503
                } else {
                    500
                }
            }
        }
    }

    /// Errors that belong to a single submitted item rather than the whole call.
    pub const fn is_item_error(&self) -> bool {
        matches!(
            self,
            Self::Missing(_)
                | Self::Invalid(_)
                | Self::NotFound { .. }
                | Self::Forbidden(_)
                | Self::QuotaExceeded(_)
                | Self::Conflict { .. }
        )
    }

    /// Connection-level storage failures that may succeed when retried.
    pub fn is_transient(&self) -> bool {
        let message = match self {
            Self::Database(message) => message.to_ascii_lowercase(),
            Self::LibSql(error) => error.to_string().to_ascii_lowercase(),
            _ => return false,
        };
        TRANSIENT_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
    }

    /// Duplicate primary key or unique index violation.
    pub fn is_unique_violation(&self) -> bool {
        let message = match self {
            Self::Database(message) => message.clone(),
            Self::LibSql(error) => error.to_string(),
            _ => return false,
        };
        message.contains("UNIQUE constraint failed")
            || message.contains("PRIMARY KEY constraint failed")
    }

    pub(crate) fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_field_and_kind_names() {
        assert_eq!(Error::Missing("name").code(), "missing-name");
        assert_eq!(Error::Invalid("id").code(), "invalid-id");
        assert_eq!(
            Error::not_found(ResourceKind::Collection, "abc").code(),
            "collection-not-found"
        );
        assert_eq!(
            Error::QuotaExceeded(QuotaKind::Trails).code(),
            "quota-exceeded-trails"
        );
        assert_eq!(
            Error::QuotaExceeded(QuotaKind::TrackBytes).code(),
            "quota-exceeded-track_bytes"
        );
    }

    #[test]
    fn status_classes() {
        assert_eq!(Error::Invalid("id").status(), 400);
        assert_eq!(Error::forbidden("nope").status(), 403);
        assert_eq!(Error::QuotaExceeded(QuotaKind::Tags).status(), 403);
        assert_eq!(Error::not_found(ResourceKind::Trail, "x").status(), 404);
        assert_eq!(
            Error::Conflict {
                kind: ResourceKind::Trail,
                id: "x".to_string()
            }
            .status(),
            409
        );
        assert_eq!(Error::Database("disk full".to_string()).status(), 500);
    }

    #[test]
    fn transient_classification() {
        assert!(Error::Database("SQLite failure: database is locked".to_string()).is_transient());
        assert!(Error::Database("Connection reset by peer".to_string()).is_transient());
        assert!(!Error::Database("no such table: trails".to_string()).is_transient());
        assert!(!Error::Invalid("id").is_transient());
        assert_eq!(
            Error::Database("database is locked".to_string()).code(),
            "storage-unavailable"
        );
    }

    #[test]
    fn unique_violation_detection() {
        assert!(Error::Database(
            "SQLite failure: `UNIQUE constraint failed: trails.id, trails.owner`".to_string()
        )
        .is_unique_violation());
        assert!(!Error::Database("FOREIGN KEY constraint failed".to_string()).is_unique_violation());
        assert!(!Error::Missing("id").is_unique_violation());
    }

    #[test]
    fn item_errors_exclude_storage_failures() {
        assert!(Error::QuotaExceeded(QuotaKind::Shares).is_item_error());
        assert!(!Error::Database("boom".to_string()).is_item_error());
    }
}
