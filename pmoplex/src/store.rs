//! In-memory library snapshot with TTL bookkeeping and disk write-through
//!
//! The store holds a single slot: the current [`LibrarySnapshot`] and the
//! moment it was produced. Readers clone an `Arc` under a read lock; writers
//! swap the whole slot under a write lock, so a reader sees either the old
//! snapshot or the new one, never a mix.
//!
//! Expiry is advisory. An expired snapshot is still returned by [`SnapshotStore::get`];
//! callers use [`CachedSnapshot::freshness`] to decide whether to refetch.
//! Nothing is ever evicted: once a snapshot exists, it is served.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::disk_cache::SnapshotFile;
use crate::error::{PlexError, Result};
use crate::models::LibrarySnapshot;

/// Where the snapshot in the slot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// Produced by a fetch from the Plex server
    Live,
    /// Loaded from `library_data.json` at startup
    Persisted,
}

/// Age class of a cached snapshot relative to the store TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Younger than the TTL
    Fresh,
    /// Older than the TTL, within the eviction grace (2 × TTL)
    Expired,
    /// Older than the eviction grace
    Evictable,
}

impl Freshness {
    pub fn is_fresh(self) -> bool {
        self == Freshness::Fresh
    }
}

/// A snapshot together with its provenance
#[derive(Debug, Clone)]
pub struct CachedSnapshot {
    snapshot: Arc<LibrarySnapshot>,
    stored_at: DateTime<Utc>,
    origin: SnapshotOrigin,
}

impl CachedSnapshot {
    pub fn snapshot(&self) -> &Arc<LibrarySnapshot> {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> Arc<LibrarySnapshot> {
        self.snapshot
    }

    pub fn stored_at(&self) -> DateTime<Utc> {
        self.stored_at
    }

    pub fn origin(&self) -> SnapshotOrigin {
        self.origin
    }

    /// Age of the snapshot; a timestamp in the future counts as zero
    pub fn age(&self) -> Duration {
        (Utc::now() - self.stored_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Classifies the snapshot against a TTL
    pub fn freshness(&self, ttl: Duration) -> Freshness {
        let age = self.age();
        if age < ttl {
            Freshness::Fresh
        } else if age < ttl.saturating_mul(2) {
            Freshness::Expired
        } else {
            Freshness::Evictable
        }
    }
}

/// Serializes write-throughs and drops those overtaken by a newer snapshot
#[derive(Debug)]
struct SnapshotWriter {
    file: Arc<SnapshotFile>,
    /// Generation of the last snapshot written to disk
    written: tokio::sync::Mutex<u64>,
}

impl SnapshotWriter {
    fn schedule(self: &Arc<Self>, generation: u64, snapshot: Arc<LibrarySnapshot>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let writer = Arc::clone(self);
                handle.spawn(async move {
                    writer.write(generation, snapshot).await;
                });
            }
            Err(_) => {
                // no runtime to hand the write to
                if let Err(e) = self.file.save(&snapshot) {
                    warn!("Error saving to cache file: {}", e);
                }
            }
        }
    }

    async fn write(&self, generation: u64, snapshot: Arc<LibrarySnapshot>) {
        let mut written = self.written.lock().await;
        if generation <= *written {
            debug!(
                "Skipping snapshot write #{}: #{} already on disk",
                generation, *written
            );
            return;
        }

        let file = Arc::clone(&self.file);
        match tokio::task::spawn_blocking(move || file.save(&snapshot)).await {
            Ok(Ok(path)) => {
                *written = generation;
                debug!("Snapshot #{} persisted to {}", generation, path.display());
            }
            Ok(Err(e)) => warn!("Error saving to cache file: {}", e),
            Err(e) => warn!("Snapshot persistence task failed: {}", e),
        }
    }
}

/// Single-slot, concurrency-safe holder of the current library snapshot
#[derive(Debug)]
pub struct SnapshotStore {
    slot: RwLock<Option<CachedSnapshot>>,
    ttl: Duration,
    generation: AtomicU64,
    writer: Option<Arc<SnapshotWriter>>,
}

impl SnapshotStore {
    /// Memory-only store
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
            generation: AtomicU64::new(0),
            writer: None,
        }
    }

    /// Store that writes every new snapshot through to `file`
    pub fn with_persistence(ttl: Duration, file: SnapshotFile) -> Self {
        Self {
            writer: Some(Arc::new(SnapshotWriter {
                file: Arc::new(file),
                written: tokio::sync::Mutex::new(0),
            })),
            ..Self::new(ttl)
        }
    }

    fn read_slot(&self) -> RwLockReadGuard<'_, Option<CachedSnapshot>> {
        self.slot.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, Option<CachedSnapshot>> {
        self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Expiry window; equal to the refresh interval
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Age past which a snapshot counts as evictable (2 × TTL)
    pub fn eviction_grace(&self) -> Duration {
        self.ttl.saturating_mul(2)
    }

    /// Persistence target, if any
    pub fn snapshot_file(&self) -> Option<&SnapshotFile> {
        self.writer.as_deref().map(|writer| writer.file.as_ref())
    }

    /// Current snapshot, whatever its age
    pub fn get(&self) -> Option<CachedSnapshot> {
        self.read_slot().clone()
    }

    /// Freshness of the current snapshot, `None` when the store is empty
    pub fn freshness(&self) -> Option<Freshness> {
        self.read_slot()
            .as_ref()
            .map(|cached| cached.freshness(self.ttl))
    }

    /// Replaces the snapshot wholesale
    ///
    /// The in-memory swap is immediate. Writing to disk happens on a
    /// background task; its failure is logged and never reported here.
    pub fn set(&self, snapshot: LibrarySnapshot) -> Arc<LibrarySnapshot> {
        let snapshot = Arc::new(snapshot);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        *self.write_slot() = Some(CachedSnapshot {
            snapshot: Arc::clone(&snapshot),
            stored_at: Utc::now(),
            origin: SnapshotOrigin::Live,
        });

        debug!(
            "Stored snapshot #{} ({} libraries, {} items)",
            generation,
            snapshot.len(),
            snapshot.item_count()
        );

        if let Some(writer) = &self.writer {
            writer.schedule(generation, Arc::clone(&snapshot));
        }

        snapshot
    }

    /// Reads the persisted snapshot without touching the slot
    ///
    /// A memory-only store has nothing persisted.
    pub fn load_persisted(&self) -> Result<LibrarySnapshot> {
        match self.snapshot_file() {
            Some(file) => file.load(),
            None => Err(PlexError::NotPersistent),
        }
    }

    /// Fills an empty slot from the persisted snapshot
    ///
    /// The snapshot is stamped with the file's modification time, so an old
    /// file is immediately expired. A slot that already holds a snapshot is
    /// left alone. Returns whether the slot was filled.
    pub fn warm_from_disk(&self) -> Result<bool> {
        let snapshot = self.load_persisted()?;
        let stored_at = self
            .snapshot_file()
            .and_then(|file| file.modified().ok())
            .unwrap_or_else(Utc::now);

        let mut slot = self.write_slot();
        if slot.is_some() {
            debug!("Snapshot already present, ignoring persisted copy");
            return Ok(false);
        }

        info!(
            "Warmed cache from disk: {} libraries, {} items (written {})",
            snapshot.len(),
            snapshot.item_count(),
            stored_at
        );
        *slot = Some(CachedSnapshot {
            snapshot: Arc::new(snapshot),
            stored_at,
            origin: SnapshotOrigin::Persisted,
        });
        Ok(true)
    }
}
