//! Periodic background refresh of the library snapshot
//!
//! The scheduler runs on its own fixed clock, independent of request traffic
//! and of the store's TTL. A failed tick is logged and the previous snapshot
//! stays in place; the next tick is the retry.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::config_ext::PlexConfigExt;
use crate::error::Result;
use crate::service::LibraryService;

/// Default refresh interval (6 hours)
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(6 * 3600);

/// Shortest accepted interval; a zero interval would spin
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Timer-driven refresh loop
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    service: Arc<LibraryService>,
    interval: Duration,
    refresh_on_start: bool,
}

impl RefreshScheduler {
    pub fn new(service: Arc<LibraryService>, interval: Duration) -> Self {
        Self {
            service,
            interval: interval.max(MIN_REFRESH_INTERVAL),
            refresh_on_start: true,
        }
    }

    /// Whether the first tick fires immediately or after one interval
    pub fn refresh_on_start(mut self, enabled: bool) -> Self {
        self.refresh_on_start = enabled;
        self
    }

    pub fn from_config(service: Arc<LibraryService>, config: &pmoconfig::Config) -> Result<Self> {
        Ok(Self::new(service, config.get_plex_refresh_interval()?)
            .refresh_on_start(config.get_plex_refresh_on_start()?))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts the loop on the current runtime
    ///
    /// The task only ends when aborted or when the runtime shuts down.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let start = if self.refresh_on_start {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };

        let mut ticker = time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Library refresh every {:?}", self.interval);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// Runs one refresh cycle; returns whether it succeeded
    pub async fn tick(&self) -> bool {
        match self.service.refresh().await {
            Ok(snapshot) => {
                info!(
                    "Library data refreshed: {} libraries, {} items",
                    snapshot.len(),
                    snapshot.item_count()
                );
                true
            }
            Err(e) => {
                warn!("Error refreshing library data, keeping previous snapshot: {}", e);
                false
            }
        }
    }
}
