use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use trailsync_core::config::{optional_trimmed, parse_in_range, required_trimmed, value_or_default};
use trailsync_core::{ConfigError, EngineConfig};

/// Minimum HS256 secret length in bytes.
const MIN_JWT_SECRET_BYTES: usize = 32;

/// Where the server keeps its data.
#[derive(Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Local(PathBuf),
    Remote { url: String, auth_token: String },
}

impl fmt::Debug for DatabaseTarget {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => formatter.debug_tuple("Local").field(path).finish(),
            Self::Remote { url, .. } => formatter
                .debug_struct("Remote")
                .field("url", url)
                .field("auth_token", &"[REDACTED]")
                .finish(),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database: DatabaseTarget,
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub auth_clock_skew: Duration,
    pub reconcile_interval: Duration,
    pub engine: EngineConfig,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database", &self.database)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("auth_clock_skew", &self.auth_clock_skew)
            .field("reconcile_interval", &self.reconcile_interval)
            .field("engine", &self.engine)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "TRAILSYNC_API_BIND_ADDR", "127.0.0.1:8080");
        let database = parse_database_target(&lookup)?;

        let jwt_secret = required_trimmed(&lookup, "TRAILSYNC_JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(ConfigError::Invalid(format!(
                "TRAILSYNC_JWT_SECRET must be at least {MIN_JWT_SECRET_BYTES} bytes"
            )));
        }
        let jwt_issuer = optional_trimmed(&lookup, "TRAILSYNC_JWT_ISSUER");

        let auth_clock_skew_secs = parse_in_range(&lookup, "AUTH_CLOCK_SKEW_SECS", 60_u64, 0..=300)?;
        let reconcile_interval_secs = parse_in_range(
            &lookup,
            "QUOTA_RECONCILE_INTERVAL_SECS",
            86_400_u64,
            60..=604_800,
        )?;

        let engine = EngineConfig::from_lookup(&lookup)?;

        Ok(Self {
            bind_addr,
            database,
            jwt_secret,
            jwt_issuer,
            auth_clock_skew: Duration::from_secs(auth_clock_skew_secs),
            reconcile_interval: Duration::from_secs(reconcile_interval_secs),
            engine,
        })
    }
}

fn parse_database_target(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<DatabaseTarget, ConfigError> {
    let url = optional_trimmed(&lookup, "TRAILSYNC_DATABASE_URL");
    let path = optional_trimmed(&lookup, "TRAILSYNC_DATABASE_PATH");

    match (url, path) {
        (Some(_), Some(_)) => Err(ConfigError::Invalid(
            "set only one of TRAILSYNC_DATABASE_URL and TRAILSYNC_DATABASE_PATH".to_string(),
        )),
        (Some(url), None) => {
            if !is_remote_url(&url) {
                return Err(ConfigError::Invalid(
                    "TRAILSYNC_DATABASE_URL must start with libsql://, https:// or http://"
                        .to_string(),
                ));
            }
            let auth_token = required_trimmed(&lookup, "TRAILSYNC_DATABASE_AUTH_TOKEN")?;
            Ok(DatabaseTarget::Remote { url, auth_token })
        }
        (None, path) => Ok(DatabaseTarget::Local(PathBuf::from(
            path.unwrap_or_else(|| "trailsync.db".to_string()),
        ))),
    }
}

fn is_remote_url(value: &str) -> bool {
    ["libsql://", "https://", "http://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}
