//! Plex settings on top of `pmoconfig::Config`
//!
//! All keys live under `plex.*`:
//!
//! ```yaml
//! plex:
//!   url: http://localhost:32400
//!   allowed_libraries: "Movies, TV Shows"
//!   refresh_interval_secs: 21600
//!   request_timeout_secs: 10
//!   refresh_on_start: true
//!   resolve_trailers: false
//!   cache:
//!     directory: cache
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pmoconfig::Config;
//! use pmoplex::PlexConfigExt;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load_config("")?;
//! println!("Plex server: {}", config.get_plex_url()?);
//! println!("Libraries: {:?}", config.get_plex_allowed_libraries()?);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use pmoconfig::Config;
use serde_yaml::Value;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::{DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS, MIN_REQUEST_TIMEOUT};
use crate::scheduler::DEFAULT_REFRESH_INTERVAL;

/// Default cache directory, relative to the configuration directory
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// Extension trait adding Plex settings to `pmoconfig::Config`
pub trait PlexConfigExt {
    /// Base URL of the Plex Media Server
    fn get_plex_url(&self) -> Result<String>;
    fn set_plex_url(&self, url: &str) -> Result<()>;

    /// Library titles to aggregate; empty means every library
    fn get_plex_allowed_libraries(&self) -> Result<Vec<String>>;
    fn set_plex_allowed_libraries(&self, titles: &[String]) -> Result<()>;

    /// Interval between two background refreshes, also the snapshot TTL
    fn get_plex_refresh_interval(&self) -> Result<Duration>;
    fn set_plex_refresh_interval(&self, interval: Duration) -> Result<()>;

    /// Per-request timeout against the Plex server, at least one second
    fn get_plex_request_timeout(&self) -> Result<Duration>;

    /// Whether the scheduler refreshes immediately at startup
    fn get_plex_refresh_on_start(&self) -> Result<bool>;

    /// Whether items without a trailer get a per-item metadata fetch
    ///
    /// Only extras whose `type` attribute is "trailer" count. Servers that tag
    /// trailers as `type="clip" subtype="trailer"` gain nothing from this and
    /// pay one extra request per item on every refresh.
    fn get_plex_resolve_trailers(&self) -> Result<bool>;
    fn set_plex_resolve_trailers(&self, enabled: bool) -> Result<()>;

    /// Directory holding `library_data.json`
    ///
    /// The path is only resolved; creating it (or falling back to the temp
    /// directory) is left to [`crate::SnapshotFile`].
    fn get_plex_cache_dir(&self) -> Result<PathBuf>;
    fn set_plex_cache_dir(&self, directory: String) -> Result<()>;
}

impl PlexConfigExt for Config {
    fn get_plex_url(&self) -> Result<String> {
        let url = self.get_string(&["plex", "url"], DEFAULT_BASE_URL)?;
        if url.trim().is_empty() {
            Ok(DEFAULT_BASE_URL.to_string())
        } else {
            Ok(url.trim().to_string())
        }
    }

    fn set_plex_url(&self, url: &str) -> Result<()> {
        self.set_value(&["plex", "url"], Value::String(url.to_string()))
    }

    fn get_plex_allowed_libraries(&self) -> Result<Vec<String>> {
        self.get_string_list(&["plex", "allowed_libraries"])
    }

    fn set_plex_allowed_libraries(&self, titles: &[String]) -> Result<()> {
        let list = titles.iter().cloned().map(Value::String).collect();
        self.set_value(&["plex", "allowed_libraries"], Value::Sequence(list))
    }

    fn get_plex_refresh_interval(&self) -> Result<Duration> {
        let secs = self.get_u64(
            &["plex", "refresh_interval_secs"],
            DEFAULT_REFRESH_INTERVAL.as_secs(),
        )?;
        Ok(Duration::from_secs(secs))
    }

    fn set_plex_refresh_interval(&self, interval: Duration) -> Result<()> {
        self.set_value(
            &["plex", "refresh_interval_secs"],
            Value::Number(interval.as_secs().into()),
        )
    }

    fn get_plex_request_timeout(&self) -> Result<Duration> {
        let secs = self.get_u64(
            &["plex", "request_timeout_secs"],
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        Ok(Duration::from_secs(secs).max(MIN_REQUEST_TIMEOUT))
    }

    fn get_plex_refresh_on_start(&self) -> Result<bool> {
        self.get_bool(&["plex", "refresh_on_start"], true)
    }

    fn get_plex_resolve_trailers(&self) -> Result<bool> {
        self.get_bool(&["plex", "resolve_trailers"], false)
    }

    fn set_plex_resolve_trailers(&self, enabled: bool) -> Result<()> {
        self.set_value(&["plex", "resolve_trailers"], Value::Bool(enabled))
    }

    fn get_plex_cache_dir(&self) -> Result<PathBuf> {
        self.resolve_managed_dir(&["plex", "cache", "directory"], DEFAULT_CACHE_DIR)
    }

    fn set_plex_cache_dir(&self, directory: String) -> Result<()> {
        self.set_managed_dir(&["plex", "cache", "directory"], directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn load(vars: &[(&str, &str)]) -> (tempfile::TempDir, Config) {
        let dir = tempdir().unwrap();
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = Config::load_with_env(dir.path().to_str().unwrap(), vars).unwrap();
        (dir, config)
    }

    #[test]
    fn test_defaults() {
        let (_dir, config) = load(&[]);

        assert_eq!(config.get_plex_url().unwrap(), DEFAULT_BASE_URL);
        assert!(config.get_plex_allowed_libraries().unwrap().is_empty());
        assert_eq!(
            config.get_plex_refresh_interval().unwrap(),
            Duration::from_secs(21600)
        );
        assert_eq!(
            config.get_plex_request_timeout().unwrap(),
            Duration::from_secs(10)
        );
        assert!(config.get_plex_refresh_on_start().unwrap());
        assert!(!config.get_plex_resolve_trailers().unwrap());
    }

    #[test]
    fn test_legacy_environment() {
        let (_dir, config) = load(&[
            ("PLEX_URL", "http://plex.lan:32400"),
            ("ALLOWED_LIBRARIES", "Movies, TV Shows"),
            ("REFRESH_INTERVAL", "600"),
        ]);

        assert_eq!(config.get_plex_url().unwrap(), "http://plex.lan:32400");
        assert_eq!(
            config.get_plex_allowed_libraries().unwrap(),
            vec!["Movies", "TV Shows"]
        );
        assert_eq!(
            config.get_plex_refresh_interval().unwrap(),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_cache_dir_is_resolved_under_config_dir() {
        let (dir, config) = load(&[]);

        let cache = config.get_plex_cache_dir().unwrap();
        assert_eq!(cache, dir.path().join(DEFAULT_CACHE_DIR));
        // created lazily by the snapshot file
        assert!(!cache.exists());
    }

    #[test]
    fn test_uncreatable_cache_dir_is_not_an_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();
        let target = blocker.join("cache");
        let vars = vec![("CACHE_DIR".to_string(), target.display().to_string())];

        let config = Config::load_with_env(dir.path().to_str().unwrap(), vars).unwrap();
        assert_eq!(config.get_plex_cache_dir().unwrap(), target);
    }

    #[test]
    fn test_zero_request_timeout_is_clamped() {
        let (_dir, config) = load(&[("PMOPLEX_CONFIG__PLEX__REQUEST_TIMEOUT_SECS", "0")]);
        assert_eq!(config.get_plex_request_timeout().unwrap(), MIN_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_allow_list_alias_is_not_yaml() {
        let (_dir, config) = load(&[("ALLOWED_LIBRARIES", "Movies: 4K,TV Shows")]);
        assert_eq!(
            config.get_plex_allowed_libraries().unwrap(),
            vec!["Movies: 4K", "TV Shows"]
        );

        let (_dir, config) = load(&[("ALLOWED_LIBRARIES", "#Kids")]);
        assert_eq!(config.get_plex_allowed_libraries().unwrap(), vec!["#Kids"]);
    }

    #[test]
    fn test_setters() {
        let (_dir, config) = load(&[]);

        config
            .set_plex_allowed_libraries(&["Music".to_string()])
            .unwrap();
        config
            .set_plex_refresh_interval(Duration::from_secs(60))
            .unwrap();
        config.set_plex_resolve_trailers(true).unwrap();

        assert_eq!(config.get_plex_allowed_libraries().unwrap(), vec!["Music"]);
        assert_eq!(
            config.get_plex_refresh_interval().unwrap(),
            Duration::from_secs(60)
        );
        assert!(config.get_plex_resolve_trailers().unwrap());
    }
}
