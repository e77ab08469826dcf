//! Data structures for Plex library payloads
//!
//! Two families live here:
//! - the raw records decoded from the Plex XML API (`RawItem`, `RawContainer`),
//!   scoped to a single fetch;
//! - the canonical, serializable model (`LibraryItem`, `LibrarySnapshot`) that
//!   the cache stores and persists as `library_data.json`.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::error::{PlexError, Result};

/// Lenient deserializer for numeric XML attributes.
///
/// Plex omits attributes it has no value for, and occasionally sends them
/// empty; both decode as the type's zero value instead of failing the whole
/// payload.
pub(crate) fn deserialize_lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().parse().unwrap_or_default())
}

// ============================================================================
// Raw XML model
// ============================================================================

/// A `<Role tag="..."/>` entry
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawTag {
    #[serde(rename = "@tag", default)]
    pub tag: String,
}

/// An `<Extra type="..." key="..."/>` entry
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawExtra {
    #[serde(rename = "@type", default)]
    pub kind: String,
    #[serde(rename = "@key", default)]
    pub key: String,
}

/// The `<Extras>` wrapper
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawExtras {
    #[serde(rename = "Extra", default)]
    pub items: Vec<RawExtra>,
}

/// One `<Video>` or `<Directory>` element
///
/// Both element kinds carry the same attribute set for our purposes; sections
/// listings only populate `title` and `key`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawItem {
    #[serde(rename = "@title", default)]
    pub title: String,
    #[serde(rename = "@key", default)]
    pub key: String,
    #[serde(rename = "@ratingKey", default)]
    pub rating_key: Option<String>,
    #[serde(rename = "@year", default, deserialize_with = "deserialize_lenient")]
    pub year: i32,
    #[serde(rename = "@thumb", default)]
    pub thumb: Option<String>,
    #[serde(rename = "@addedAt", default, deserialize_with = "deserialize_lenient")]
    pub added_at: i64,
    #[serde(rename = "@rating", default, deserialize_with = "deserialize_lenient")]
    pub rating: f64,
    #[serde(rename = "@summary", default)]
    pub summary: String,
    #[serde(rename = "Role", default)]
    pub roles: Vec<RawTag>,
    #[serde(rename = "Extras", default)]
    pub extras: RawExtras,
}

/// `<MediaContainer>` exactly as it comes off the wire
#[derive(Debug, Default, Deserialize)]
struct MediaContainerXml {
    #[serde(rename = "Video", default)]
    videos: Vec<RawItem>,
    #[serde(rename = "Directory", default)]
    directories: Vec<RawItem>,
}

/// Decoded Plex response
///
/// The API answers "what is in this container" with either a list of
/// `<Video>` elements (movies) or a list of `<Directory>` elements (shows,
/// sections), never both.
#[derive(Debug, Clone, PartialEq)]
pub enum RawContainer {
    Videos(Vec<RawItem>),
    Directories(Vec<RawItem>),
}

impl RawContainer {
    /// Decodes a `<MediaContainer>` document.
    ///
    /// A container with neither element kind decodes as an empty
    /// `Directories`. A container carrying both is rejected.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let container: MediaContainerXml = quick_xml::de::from_str(xml)?;

        match (container.videos.is_empty(), container.directories.is_empty()) {
            (false, false) => Err(PlexError::unexpected_shape(format!(
                "container holds {} Video and {} Directory entries",
                container.videos.len(),
                container.directories.len()
            ))),
            (false, true) => Ok(Self::Videos(container.videos)),
            (true, _) => Ok(Self::Directories(container.directories)),
        }
    }

    pub fn items(&self) -> &[RawItem] {
        match self {
            Self::Videos(items) | Self::Directories(items) => items,
        }
    }

    pub fn items_mut(&mut self) -> &mut [RawItem] {
        match self {
            Self::Videos(items) | Self::Directories(items) => items,
        }
    }

    pub fn into_items(self) -> Vec<RawItem> {
        match self {
            Self::Videos(items) | Self::Directories(items) => items,
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

// ============================================================================
// Canonical model
// ============================================================================

/// A library section on the Plex server (Movies, TV Shows, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySection {
    pub title: String,
    pub key: String,
}

impl LibrarySection {
    pub fn new(title: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            key: key.into(),
        }
    }
}

fn is_zero_i32(v: &i32) -> bool {
    *v == 0
}

fn is_zero_f64(v: &f64) -> bool {
    *v == 0.0
}

/// A normalized library item
///
/// `thumb_url` and `trailer_url` always point at the local `/thumbnail` proxy,
/// never at the Plex origin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryItem {
    pub title: String,
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    pub year: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thumb_url: String,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub rating: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cast: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailer_url: Option<String>,
}

/// Library title → ordered items
///
/// The unit of caching and persistence. Sections keep the order in which the
/// server listed them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct LibrarySnapshot {
    libraries: IndexMap<String, Vec<LibraryItem>>,
}

impl LibrarySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a library, returning the items it replaced if the title was already present
    pub fn insert(
        &mut self,
        title: impl Into<String>,
        items: Vec<LibraryItem>,
    ) -> Option<Vec<LibraryItem>> {
        self.libraries.insert(title.into(), items)
    }

    pub fn get(&self, title: &str) -> Option<&[LibraryItem]> {
        self.libraries.get(title).map(Vec::as_slice)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.libraries.contains_key(title)
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.libraries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[LibraryItem])> {
        self.libraries
            .iter()
            .map(|(title, items)| (title.as_str(), items.as_slice()))
    }

    /// Number of libraries
    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Number of items across all libraries
    pub fn item_count(&self) -> usize {
        self.libraries.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOVIES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MediaContainer size="2" title1="Movies">
  <Video ratingKey="42" key="/library/metadata/42" title="Heat" year="1995" thumb="/library/metadata/42/thumb/1700000000" addedAt="1700000000" rating="8.3" summary="A group of professional bank robbers.">
    <Media id="1" duration="10200000"><Part id="1" file="/movies/heat.mkv"/></Media>
    <Genre tag="Crime"/>
    <Role tag="Al Pacino"/>
    <Role tag="Robert De Niro"/>
  </Video>
  <Video ratingKey="43" key="/library/metadata/43" title="Untitled" year="" rating="" addedAt="1700000100"/>
</MediaContainer>"#;

    const SECTIONS_XML: &str = r#"<MediaContainer size="2" title1="Plex Library">
  <Directory key="1" type="movie" title="Movies"><Location id="1" path="/movies"/></Directory>
  <Directory key="2" type="show" title="TV Shows"><Location id="2" path="/tv"/></Directory>
</MediaContainer>"#;

    #[test]
    fn test_decode_videos() {
        let container = RawContainer::from_xml(MOVIES_XML).unwrap();
        let RawContainer::Videos(videos) = &container else {
            panic!("expected videos, got {:?}", container);
        };

        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].title, "Heat");
        assert_eq!(videos[0].year, 1995);
        assert_eq!(videos[0].rating, 8.3);
        assert_eq!(videos[0].added_at, 1_700_000_000);
        assert_eq!(videos[0].rating_key.as_deref(), Some("42"));
        assert_eq!(
            videos[0].roles.iter().map(|r| r.tag.as_str()).collect::<Vec<_>>(),
            vec!["Al Pacino", "Robert De Niro"]
        );

        // empty numeric attributes fall back to zero
        assert_eq!(videos[1].year, 0);
        assert_eq!(videos[1].rating, 0.0);
        assert!(videos[1].thumb.is_none());
    }

    #[test]
    fn test_decode_directories() {
        let container = RawContainer::from_xml(SECTIONS_XML).unwrap();
        let RawContainer::Directories(dirs) = &container else {
            panic!("expected directories, got {:?}", container);
        };
        assert_eq!(dirs.len(), 2);
        assert_eq!(dirs[1].title, "TV Shows");
        assert_eq!(dirs[1].key, "2");
    }

    #[test]
    fn test_decode_extras() {
        let xml = r#"<MediaContainer size="1">
  <Video title="Alien" ratingKey="7">
    <Extras size="2">
      <Extra type="Featurette" key="/library/metadata/70"/>
      <Extra type="Trailer" key="/library/metadata/71"/>
    </Extras>
  </Video>
</MediaContainer>"#;

        let container = RawContainer::from_xml(xml).unwrap();
        let extras = &container.items()[0].extras.items;
        assert_eq!(extras.len(), 2);
        assert_eq!(extras[1].kind, "Trailer");
        assert_eq!(extras[1].key, "/library/metadata/71");
    }

    #[test]
    fn test_decode_empty_container() {
        let container = RawContainer::from_xml(r#"<MediaContainer size="0"/>"#).unwrap();
        assert!(container.is_empty());
        assert_eq!(container, RawContainer::Directories(Vec::new()));
    }

    #[test]
    fn test_decode_rejects_mixed_container() {
        let xml = r#"<MediaContainer><Video title="a"/><Directory title="b"/></MediaContainer>"#;
        let err = RawContainer::from_xml(xml).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = RawContainer::from_xml("<MediaContainer><Video title=\"a\"").unwrap_err();
        assert!(err.is_decode(), "unexpected error: {err}");
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut snapshot = LibrarySnapshot::new();
        snapshot.insert(
            "Movies",
            vec![LibraryItem {
                title: "Heat".to_string(),
                year: 1995,
                thumb_url: String::new(),
                added_at: DateTime::from_timestamp(0, 0).unwrap(),
                rating: 0.0,
                description: String::new(),
                cast: Vec::new(),
                trailer_url: None,
            }],
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Movies": [{
                    "title": "Heat",
                    "year": 1995,
                    "added_at": "1970-01-01T00:00:00Z"
                }]
            })
        );

        let back: LibrarySnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let mut snapshot = LibrarySnapshot::new();
        snapshot.insert("TV Shows", Vec::new());
        snapshot.insert("Movies", Vec::new());
        snapshot.insert("Anime", Vec::new());

        assert_eq!(
            snapshot.titles().collect::<Vec<_>>(),
            vec!["TV Shows", "Movies", "Anime"]
        );
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.item_count(), 0);
    }
}
