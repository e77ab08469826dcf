//! Plex library aggregator for PMOPlex
//!
//! This crate fetches the libraries of a Plex Media Server, normalizes their
//! items into one canonical model and keeps the result cached in memory and on
//! disk (`library_data.json`), refreshed on a timer.
//!
//! # Pipeline
//!
//! - [`PlexClient`]: HTTP/XML client for `/library/sections`,
//!   `/library/sections/{key}/all` and `/library/metadata/{key}`
//! - [`normalize`]: turns the two Plex response shapes (`<Video>` lists for
//!   movies, `<Directory>` lists for shows) into [`LibraryItem`]s, rewriting
//!   thumbnail and trailer paths onto the local `/thumbnail` proxy
//! - [`LibraryAggregator`]: enumerates sections, applies the [`AllowList`],
//!   builds a [`LibrarySnapshot`]
//! - [`SnapshotStore`]: single-slot cache with advisory TTL and write-through
//!   to [`SnapshotFile`]
//! - [`RefreshScheduler`]: background task refreshing the store on a fixed
//!   interval (6 hours by default)
//! - [`LibraryService`]: ties everything together and serves reads,
//!   refetching on demand when the snapshot is missing or expired
//!
//! Once any snapshot exists, live or persisted, it is always served. A failed
//! refresh never replaces good data.
//!
//! # Example
//!
//! ```no_run
//! use pmoconfig::Config;
//! use pmoplex::{LibraryService, RefreshScheduler};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_config("")?;
//!     let service = Arc::new(LibraryService::from_config(&config)?);
//!
//!     // Serve the last persisted snapshot until the first live fetch lands
//!     service.warm_start();
//!     RefreshScheduler::from_config(service.clone(), &config)?.spawn();
//!
//!     let libraries = service.library_data().await?;
//!     for (title, items) in libraries.iter() {
//!         println!("{}: {} items", title, items.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod client;
pub mod config_ext;
pub mod disk_cache;
pub mod error;
pub mod models;
pub mod normalize;
pub mod scheduler;
pub mod service;
pub mod store;

pub use aggregator::{AllowList, LibraryAggregator};
pub use client::{ClientBuilder, PlexClient};
pub use config_ext::PlexConfigExt;
pub use disk_cache::SnapshotFile;
pub use error::{PlexError, Result};
pub use models::{LibraryItem, LibrarySection, LibrarySnapshot, RawContainer, RawItem};
pub use normalize::normalize;
pub use scheduler::RefreshScheduler;
pub use service::LibraryService;
pub use store::{CachedSnapshot, Freshness, SnapshotOrigin, SnapshotStore};
