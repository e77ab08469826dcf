//! On-disk copy of the library snapshot
//!
//! The snapshot is written as `library_data.json` in the cache directory. The
//! file is both the cold-start source for the in-memory store and the artifact
//! read by the web front-end.
//!
//! Writes go to a temporary sibling first and are renamed into place, so a
//! reader never sees a half-written file.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{PlexError, Result};
use crate::models::LibrarySnapshot;

/// File name of the persisted snapshot
pub const SNAPSHOT_FILE_NAME: &str = "library_data.json";

/// JSON snapshot file in a cache directory
///
/// If the configured directory cannot be created, the OS temporary directory
/// is used instead and kept for subsequent reads and writes.
#[derive(Debug)]
pub struct SnapshotFile {
    /// Directory currently in use
    dir: Mutex<PathBuf>,
}

impl SnapshotFile {
    /// Creates a snapshot file handle; nothing touches the disk until the first save
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            dir: Mutex::new(cache_dir.as_ref().to_path_buf()),
        }
    }

    fn dir(&self) -> MutexGuard<'_, PathBuf> {
        self.dir.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Directory currently in use
    pub fn cache_dir(&self) -> PathBuf {
        self.dir().clone()
    }

    /// Full path of the snapshot file
    ///
    /// Format: `{cache_dir}/library_data.json`
    pub fn path(&self) -> PathBuf {
        self.dir().join(SNAPSHOT_FILE_NAME)
    }

    /// Makes sure the cache directory exists, falling back to the temp dir
    fn ensure_dir(&self) -> Result<PathBuf> {
        let mut dir = self.dir();

        if let Err(e) = fs::create_dir_all(&*dir) {
            let fallback = std::env::temp_dir();
            warn!(
                "Failed to create cache directory {} ({}), falling back to {}",
                dir.display(),
                e,
                fallback.display()
            );
            fs::create_dir_all(&fallback).map_err(|e| PlexError::io(&fallback, e))?;
            *dir = fallback;
        }

        Ok(dir.clone())
    }

    /// Writes the snapshot, replacing any previous one
    pub fn save(&self, snapshot: &LibrarySnapshot) -> Result<PathBuf> {
        let dir = self.ensure_dir()?;
        let path = dir.join(SNAPSHOT_FILE_NAME);
        let tmp = dir.join(format!("{}.tmp", SNAPSHOT_FILE_NAME));

        let json = serde_json::to_vec_pretty(snapshot).map_err(|source| {
            PlexError::CorruptSnapshot {
                path: path.clone(),
                source,
            }
        })?;

        fs::write(&tmp, json).map_err(|e| PlexError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| PlexError::io(&path, e))?;

        debug!(
            "Saved snapshot ({} libraries, {} items) to {}",
            snapshot.len(),
            snapshot.item_count(),
            path.display()
        );
        Ok(path)
    }

    /// Reads the snapshot back
    ///
    /// Fails with [`PlexError::NoSnapshot`] when nothing was ever written and
    /// [`PlexError::CorruptSnapshot`] when the file does not parse.
    pub fn load(&self) -> Result<LibrarySnapshot> {
        let path = self.path();

        let json = match fs::read(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Snapshot file does not exist: {}", path.display());
                return Err(PlexError::NoSnapshot(path));
            }
            Err(e) => return Err(PlexError::io(&path, e)),
        };

        let snapshot: LibrarySnapshot = serde_json::from_slice(&json)
            .map_err(|source| PlexError::CorruptSnapshot {
                path: path.clone(),
                source,
            })?;

        info!(
            "Loaded snapshot ({} libraries) from {}",
            snapshot.len(),
            path.display()
        );
        Ok(snapshot)
    }

    /// Last modification time of the snapshot file
    pub fn modified(&self) -> Result<DateTime<Utc>> {
        let path = self.path();
        let modified = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .map_err(|e| PlexError::io(&path, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    /// Removes the snapshot file if present
    pub fn invalidate(&self) -> Result<()> {
        let path = self.path();

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Invalidated snapshot: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PlexError::io(&path, e)),
        }
    }
}
