//! Aggregator + store wiring, and the on-demand read path
//!
//! [`LibraryService`] is the object shared between the refresh scheduler and
//! whatever serves requests. It is built once and passed around in an `Arc`;
//! there is no global instance.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::aggregator::{AllowList, LibraryAggregator};
use crate::client::PlexClient;
use crate::config_ext::PlexConfigExt;
use crate::disk_cache::SnapshotFile;
use crate::error::{PlexError, Result};
use crate::models::LibrarySnapshot;
use crate::store::SnapshotStore;

/// Library cache service
#[derive(Debug)]
pub struct LibraryService {
    aggregator: LibraryAggregator,
    store: Arc<SnapshotStore>,
    /// Serializes refetches so concurrent misses trigger a single fetch
    refresh_lock: tokio::sync::Mutex<()>,
}

impl LibraryService {
    pub fn new(aggregator: LibraryAggregator, store: Arc<SnapshotStore>) -> Self {
        Self {
            aggregator,
            store,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Builds the client, allow-list and persistent store from configuration
    pub fn from_config(config: &pmoconfig::Config) -> Result<Self> {
        let client = PlexClient::builder()
            .base_url(config.get_plex_url()?)
            .timeout(config.get_plex_request_timeout()?)
            .build()?;

        let allow_list = AllowList::new(config.get_plex_allowed_libraries()?);
        if allow_list.is_empty() {
            info!("No library allow-list configured, aggregating every library");
        }

        let aggregator = LibraryAggregator::new(client, allow_list)
            .with_trailer_resolution(config.get_plex_resolve_trailers()?);

        let file = SnapshotFile::new(config.get_plex_cache_dir()?);
        let store = SnapshotStore::with_persistence(config.get_plex_refresh_interval()?, file);

        Ok(Self::new(aggregator, Arc::new(store)))
    }

    pub fn aggregator(&self) -> &LibraryAggregator {
        &self.aggregator
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Fills the store from the persisted snapshot, if there is one
    ///
    /// A missing or corrupt file only means the cache starts empty.
    pub fn warm_start(&self) -> bool {
        match self.store.warm_from_disk() {
            Ok(filled) => filled,
            Err(PlexError::NoSnapshot(path)) => {
                info!("No persisted snapshot at {}, starting empty", path.display());
                false
            }
            Err(e) => {
                warn!("Ignoring persisted snapshot: {}", e);
                false
            }
        }
    }

    /// Fetches a fresh snapshot and installs it
    ///
    /// On failure the store is left untouched.
    pub async fn refresh(&self) -> Result<Arc<LibrarySnapshot>> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<Arc<LibrarySnapshot>> {
        let snapshot = self.aggregator.aggregate().await?;
        Ok(self.store.set(snapshot))
    }

    /// Current library data, refetched when missing or expired
    ///
    /// A fresh snapshot is returned as is. Otherwise one caller refetches while
    /// the others wait for its result. If the refetch fails, the stale snapshot
    /// is served; the error surfaces only when there is nothing to serve.
    pub async fn library_data(&self) -> Result<Arc<LibrarySnapshot>> {
        if let Some(cached) = self.store.get() {
            if cached.freshness(self.store.ttl()).is_fresh() {
                return Ok(cached.into_snapshot());
            }
        }

        let _guard = self.refresh_lock.lock().await;

        // someone else may have refreshed while we waited
        let current = self.store.get();
        if let Some(cached) = &current {
            if cached.freshness(self.store.ttl()).is_fresh() {
                debug!("Snapshot refreshed by a concurrent caller");
                return Ok(Arc::clone(cached.snapshot()));
            }
        }

        match self.refresh_locked().await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => match current {
                Some(stale) => {
                    warn!(
                        "Error refreshing library data, serving snapshot from {}: {}",
                        stale.stored_at(),
                        e
                    );
                    Ok(stale.into_snapshot())
                }
                None => Err(e),
            },
        }
    }
}
