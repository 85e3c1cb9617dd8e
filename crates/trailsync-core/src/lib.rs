//! trailsync-core - Replication core for trailsync
//!
//! This crate contains the resource models, the differential sync diff, the
//! generic bulk mutation engine and the per-account quota ledger shared by the
//! trailsync interfaces (API server, admin CLI).

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod retry;
pub mod services;
pub mod stores;
pub mod sync;
pub mod util;

pub use config::{ConfigError, EngineConfig};
pub use db::{Database, QuotaLedger};
pub use engine::{BulkCreated, BulkEngine, ItemError, ResourceStore};
pub use error::{Error, Result};
pub use retry::{with_retry, RetryPolicy};
pub use sync::compute_sync;
