//! Database layer for trailsync

mod connection;
mod migrations;
mod quota;
pub mod record;
mod updater;

pub use connection::Database;
pub use quota::QuotaLedger;
pub use record::TableRecord;
pub use updater::{conditional_update, has_changes};
