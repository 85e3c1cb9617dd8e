//! Engine configuration read from the environment.
//!
//! Every reader takes a `lookup` function instead of touching the process
//! environment directly so configuration can be tested with a plain map.

use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::models::{QuotaKind, QuotaPlan};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tuning knobs for the bulk engine and the quota plan of new accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Conditional updates in flight per bulk update call.
    pub bulk_concurrency: usize,
    /// Rows per multi-row insert statement.
    pub insert_chunk_size: usize,
    /// Extra attempts after a transient storage failure.
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub quota_plan: QuotaPlan,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bulk_concurrency: 3,
            insert_chunk_size: 100,
            retry_attempts: 2,
            retry_base_delay: Duration::from_millis(50),
            quota_plan: QuotaPlan::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bulk_concurrency =
            parse_in_range(&lookup, "TRAILSYNC_BULK_CONCURRENCY", 3_usize, 1..=16)?;
        let insert_chunk_size =
            parse_in_range(&lookup, "TRAILSYNC_INSERT_CHUNK_SIZE", 100_usize, 1..=500)?;
        let retry_attempts = parse_in_range(&lookup, "TRAILSYNC_RETRY_ATTEMPTS", 2_u32, 0..=5)?;
        let retry_base_delay_ms =
            parse_in_range(&lookup, "TRAILSYNC_RETRY_BASE_DELAY_MS", 50_u64, 1..=5_000)?;

        let mut quota_plan = QuotaPlan::default();
        for kind in QuotaKind::ALL {
            let name = plan_variable(kind);
            let Some(raw) = optional_trimmed(&lookup, name) else {
                continue;
            };
            let max = raw
                .parse::<i64>()
                .ok()
                .filter(|max| *max >= 0)
                .ok_or_else(|| ConfigError::Invalid(format!("{name} must be an integer >= 0")))?;
            quota_plan.set_max(kind, max);
        }

        Ok(Self {
            bulk_concurrency,
            insert_chunk_size,
            retry_attempts,
            retry_base_delay: Duration::from_millis(retry_base_delay_ms),
            quota_plan,
        })
    }
}

const fn plan_variable(kind: QuotaKind) -> &'static str {
    match kind {
        QuotaKind::Collections => "QUOTA_DEFAULT_COLLECTIONS_MAX",
        QuotaKind::Trails => "QUOTA_DEFAULT_TRAILS_MAX",
        QuotaKind::Tracks => "QUOTA_DEFAULT_TRACKS_MAX",
        QuotaKind::Tags => "QUOTA_DEFAULT_TAGS_MAX",
        QuotaKind::Shares => "QUOTA_DEFAULT_SHARES_MAX",
        QuotaKind::TrackBytes => "QUOTA_DEFAULT_TRACK_BYTES_MAX",
        QuotaKind::PhotoBytes => "QUOTA_DEFAULT_PHOTO_BYTES_MAX",
    }
}

/// Parse `name` as a number within `range`, falling back to `default` when unset.
pub fn parse_in_range<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Display,
{
    let invalid = || {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    };
    let value = match optional_trimmed(lookup, name) {
        Some(raw) => raw.parse::<T>().map_err(|_| invalid())?,
        None => default,
    };
    if !range.contains(&value) {
        return Err(invalid());
    }
    Ok(value)
}

pub fn value_or_default(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

pub fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

pub fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        EngineConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config_from(&[]).unwrap(), EngineConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("TRAILSYNC_BULK_CONCURRENCY", "8"),
            ("TRAILSYNC_INSERT_CHUNK_SIZE", " 25 "),
            ("TRAILSYNC_RETRY_ATTEMPTS", "0"),
            ("QUOTA_DEFAULT_TRAILS_MAX", "5"),
        ])
        .unwrap();
        assert_eq!(config.bulk_concurrency, 8);
        assert_eq!(config.insert_chunk_size, 25);
        assert_eq!(config.retry_attempts, 0);
        assert_eq!(config.quota_plan.max_for(QuotaKind::Trails), 5);
        assert_eq!(config.quota_plan.max_for(QuotaKind::Tags), 500);
    }

    #[test]
    fn rejects_out_of_range_concurrency() {
        let err = config_from(&[("TRAILSYNC_BULK_CONCURRENCY", "0")]).unwrap_err();
        assert!(err.to_string().contains("TRAILSYNC_BULK_CONCURRENCY"));
        assert!(config_from(&[("TRAILSYNC_BULK_CONCURRENCY", "many")]).is_err());
    }

    #[test]
    fn rejects_negative_plan_limit() {
        let err = config_from(&[("QUOTA_DEFAULT_SHARES_MAX", "-1")]).unwrap_err();
        assert!(err.to_string().contains("QUOTA_DEFAULT_SHARES_MAX"));
    }
}
