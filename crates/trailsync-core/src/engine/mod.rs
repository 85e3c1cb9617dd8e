//! Generic replication engine shared by every resource kind

mod bulk;
mod reserve;
mod store;

pub use bulk::{BulkCreated, BulkEngine, ItemError};
pub use reserve::release;
pub use store::ResourceStore;
