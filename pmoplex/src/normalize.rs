//! Raw Plex records → canonical [`LibraryItem`]s
//!
//! Pure functions: no I/O, no reordering, no deduplication. The order the
//! server sent is the order the caller gets.

use chrono::{DateTime, Utc};

use crate::models::{LibraryItem, RawContainer, RawExtra, RawItem};

/// Prefix of the local reverse-proxy route serving Plex thumbnails and media
pub const THUMBNAIL_PREFIX: &str = "/thumbnail";

/// Normalizes every record of a container, whichever shape it has
pub fn normalize(container: &RawContainer) -> Vec<LibraryItem> {
    match container {
        RawContainer::Videos(videos) => videos.iter().map(normalize_item).collect(),
        RawContainer::Directories(dirs) => dirs.iter().map(normalize_item).collect(),
    }
}

/// Normalizes a single `<Video>` or `<Directory>` record
pub fn normalize_item(raw: &RawItem) -> LibraryItem {
    LibraryItem {
        title: raw.title.clone(),
        year: raw.year,
        thumb_url: raw.thumb.as_deref().map(proxy_path).unwrap_or_default(),
        added_at: timestamp(raw.added_at),
        rating: raw.rating,
        description: raw.summary.clone(),
        cast: raw.roles.iter().map(|role| role.tag.clone()).collect(),
        trailer_url: trailer_url(&raw.extras.items),
    }
}

/// Rewrites an upstream path onto the local proxy; empty stays empty
pub fn proxy_path(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{}{}", THUMBNAIL_PREFIX, path)
    }
}

/// Proxy URL of the first extra typed "trailer" (case-insensitive)
pub fn trailer_url(extras: &[RawExtra]) -> Option<String> {
    extras
        .iter()
        .find(|extra| is_trailer(extra))
        .map(|extra| proxy_path(&extra.key))
        .filter(|url| !url.is_empty())
}

pub(crate) fn is_trailer(extra: &RawExtra) -> bool {
    extra.kind.eq_ignore_ascii_case("trailer")
}

/// Epoch seconds → UTC timestamp; out-of-range values clamp to the epoch
fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
