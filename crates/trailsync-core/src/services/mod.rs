//! Account-level operations built on the stores and the quota ledger

mod accounts;
mod reconcile;

pub use accounts::{default_collection, provision_account, DEFAULT_COLLECTION_NAME};
pub use reconcile::{reconcile_quotas, spawn_quota_reconciliation};
