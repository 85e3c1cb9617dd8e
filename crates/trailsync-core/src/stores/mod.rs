//! One store per resource kind

mod collections;
mod photos;
mod shares;
mod tags;
mod trail_tags;
mod tracks;
mod trails;

use std::iter;

use libsql::Value;

pub use collections::CollectionStore;
pub use photos::PhotoStore;
pub use shares::ShareStore;
pub use tags::TagStore;
pub use trail_tags::TrailTagStore;
pub use tracks::TrackStore;
pub use trails::TrailStore;

/// Bind values for `owner = ? AND x IN (?, ...)`.
pub(crate) fn owner_and(owner: &str, ids: &[String]) -> Vec<Value> {
    iter::once(Value::Text(owner.to_string()))
        .chain(ids.iter().cloned().map(Value::Text))
        .collect()
}
