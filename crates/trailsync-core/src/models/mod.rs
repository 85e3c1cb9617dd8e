//! Data models for trailsync

mod collection;
mod photo;
mod quota;
mod resource;
mod share;
mod tag;
mod track;
mod trail;
mod validation;

pub use collection::{Collection, CollectionDraft, CollectionDto, CollectionType};
pub use photo::{Photo, PhotoDraft, PhotoDto, PHOTO_MAX_BYTES};
pub use quota::{QuotaCost, QuotaCounter, QuotaKind, QuotaPlan};
pub use resource::{KnownMarker, ResourceKey, ResourceKind, SyncResult, Versioned};
pub use share::{Share, ShareDraft, ShareDto, ShareElementType};
pub use tag::{Tag, TagDraft, TagDto, TrailTag, TrailTagDto};
pub use track::{Track, TrackDraft, TrackDto, TRACK_MAX_BYTES};
pub use trail::{Trail, TrailDraft, TrailDto};
pub use validation::{Draft, Submission};
