//! Library enumeration, allow-list filtering and per-section normalization

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::client::PlexClient;
use crate::error::Result;
use crate::models::{LibrarySection, LibrarySnapshot, RawContainer, RawExtras};
use crate::normalize::{is_trailer, normalize};

/// Maximum number of concurrent per-item metadata requests
pub const TRAILER_FETCH_CONCURRENCY: usize = 4;

/// Set of library titles allowed into the snapshot
///
/// Matching is case-insensitive and exact. An empty allow-list lets every
/// library through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    titles: Vec<String>,
}

impl AllowList {
    /// Builds an allow-list; entries are trimmed and blank ones dropped
    pub fn new<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            titles: titles
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Parses a comma-separated list such as `"Movies, TV Shows"`
    pub fn parse(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    /// Allow-list letting every library through
    pub fn all() -> Self {
        Self::default()
    }

    pub fn allows(&self, title: &str) -> bool {
        self.titles.is_empty() || self.titles.contains(&title.trim().to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

/// Builds a [`LibrarySnapshot`] from the Plex server
#[derive(Debug, Clone)]
pub struct LibraryAggregator {
    client: PlexClient,
    allow_list: AllowList,
    resolve_trailers: bool,
}

impl LibraryAggregator {
    pub fn new(client: PlexClient, allow_list: AllowList) -> Self {
        Self {
            client,
            allow_list,
            resolve_trailers: false,
        }
    }

    /// Fetch per-item metadata for items whose listing carries no trailer
    ///
    /// Trailers are recognised by the extra's `type` attribute alone; an
    /// extra typed `clip` with `subtype="trailer"` is not one.
    pub fn with_trailer_resolution(mut self, enabled: bool) -> Self {
        self.resolve_trailers = enabled;
        self
    }

    pub fn client(&self) -> &PlexClient {
        &self.client
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Aggregates with the configured allow-list
    pub async fn aggregate(&self) -> Result<LibrarySnapshot> {
        self.aggregate_with(&self.allow_list).await
    }

    /// Aggregates every allowed library into a snapshot
    ///
    /// Fails only when the section listing fails. A library whose items
    /// cannot be fetched or decoded is logged and left out.
    pub async fn aggregate_with(&self, allow_list: &AllowList) -> Result<LibrarySnapshot> {
        let sections = self.client.list_sections().await?;
        let mut snapshot = LibrarySnapshot::new();

        for section in sections {
            if !allow_list.allows(&section.title) {
                debug!("Skipping library not in allow-list: {}", section.title);
                continue;
            }

            match self.fetch_section(&section).await {
                Ok(container) => {
                    let items = normalize(&container);
                    debug!("Library {}: {} items", section.title, items.len());
                    if snapshot.contains(&section.title) {
                        warn!(
                            "Duplicate library title {}, keeping key {}",
                            section.title, section.key
                        );
                    }
                    snapshot.insert(section.title, items);
                }
                Err(e) => {
                    warn!(
                        "Error fetching items for library {} (key {}): {}",
                        section.title, section.key, e
                    );
                }
            }
        }

        info!(
            "Aggregated {} libraries, {} items",
            snapshot.len(),
            snapshot.item_count()
        );
        Ok(snapshot)
    }

    async fn fetch_section(&self, section: &LibrarySection) -> Result<RawContainer> {
        let mut container = self.client.list_items(&section.key).await?;
        if self.resolve_trailers {
            self.resolve_extras(&mut container).await;
        }
        Ok(container)
    }

    /// Fills in the extras of items that have no trailer in the listing
    ///
    /// Failures only cost the item its trailer.
    async fn resolve_extras(&self, container: &mut RawContainer) {
        let pending: Vec<(usize, String)> = container
            .items()
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.extras.items.iter().any(is_trailer))
            .filter_map(|(idx, item)| {
                item.rating_key
                    .as_ref()
                    .filter(|key| !key.is_empty())
                    .map(|key| (idx, key.clone()))
            })
            .collect();

        if pending.is_empty() {
            return;
        }
        debug!("Resolving extras for {} items", pending.len());

        let resolved: Vec<(usize, Option<RawExtras>)> = stream::iter(pending)
            .map(|(idx, key)| {
                let client = self.client.clone();
                async move {
                    match client.fetch_metadata(&key).await {
                        Ok(details) => {
                            let extras = details.into_items().into_iter().next().map(|i| i.extras);
                            (idx, extras)
                        }
                        Err(e) => {
                            warn!("Error fetching metadata for item {}: {}", key, e);
                            (idx, None)
                        }
                    }
                }
            })
            .buffer_unordered(TRAILER_FETCH_CONCURRENCY)
            .collect()
            .await;

        let items = container.items_mut();
        for (idx, extras) in resolved {
            if let Some(extras) = extras {
                items[idx].extras = extras;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allow_list_allows_everything() {
        let allow = AllowList::all();
        assert!(allow.is_empty());
        assert!(allow.allows("Movies"));
        assert!(allow.allows(""));
    }

    #[test]
    fn test_allow_list_is_case_insensitive() {
        let allow = AllowList::new(["Movies", "tv shows"]);
        assert!(allow.allows("Movies"));
        assert!(allow.allows("MOVIES"));
        assert!(allow.allows("TV Shows"));
        assert!(!allow.allows("Music"));
        assert!(!allow.allows("Movie"));
    }

    #[test]
    fn test_parse_csv() {
        assert_eq!(
            AllowList::parse(" Movies ,TV Shows,"),
            AllowList::new(["movies", "tv shows"])
        );
        assert!(AllowList::parse("").is_empty());
        assert!(AllowList::parse(" , ").is_empty());
    }
}
