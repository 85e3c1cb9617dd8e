//! Shared utility functions used across multiple modules.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Account identifiers compare case-insensitively and are stored lowercase.
pub fn normalize_owner(owner: &str) -> String {
    owner.trim().to_lowercase()
}

/// Lowercase and trim an identifier presented by a client.
pub fn normalize_id(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Stable-per-process fingerprint of an owner, for logs that must not carry the address.
pub fn owner_fingerprint(owner: &str) -> String {
    let mut hasher = DefaultHasher::new();
    owner.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
