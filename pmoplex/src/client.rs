//! HTTP client for the Plex Media Server XML API
//!
//! The client is stateless and does not cache or retry: a failed call is
//! reported to the caller, and retry policy lives with the refresh scheduler.
//!
//! # Example
//!
//! ```no_run
//! use pmoplex::PlexClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PlexClient::new("http://localhost:32400")?;
//!
//!     for section in client.list_sections().await? {
//!         let items = client.list_items(&section.key).await?;
//!         println!("{}: {} items", section.title, items.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

use crate::error::{PlexError, Result};
use crate::models::{LibrarySection, RawContainer};
use reqwest::Client;
use reqwest::header::ACCEPT;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default Plex base URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:32400";

/// Default timeout for HTTP requests (10 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Shortest accepted request timeout; a zero timeout would fail every request
pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = concat!("PMOPlex/", env!("CARGO_PKG_VERSION"), " (pmoplex)");

const METADATA_PREFIX: &str = "/library/metadata/";

/// Plex Media Server HTTP client
///
/// Three endpoints are used:
/// - `GET {base}/library/sections`: library enumeration
/// - `GET {base}/library/sections/{key}/all`: items of one library
/// - `GET {base}/library/metadata/{key}`: one item, with extras
#[derive(Debug, Clone)]
pub struct PlexClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl PlexClient {
    /// Create a client for `base_url` with default settings
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a builder for configuring the client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Get the base URL (without trailing slash)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the per-request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get the internal HTTP client
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    /// List the library sections of the server
    ///
    /// Only the `title`/`key` pairs of the `<Directory>` entries are kept.
    pub async fn list_sections(&self) -> Result<Vec<LibrarySection>> {
        let container = self.get_container("/library/sections", &[]).await?;

        let directories = match container {
            RawContainer::Directories(dirs) => dirs,
            RawContainer::Videos(videos) => {
                return Err(PlexError::unexpected_shape(format!(
                    "sections listing returned {} Video entries",
                    videos.len()
                )));
            }
        };

        let sections: Vec<LibrarySection> = directories
            .into_iter()
            .map(|dir| {
                debug!("Found library: {} with key: {}", dir.title, dir.key);
                LibrarySection::new(dir.title, dir.key)
            })
            .collect();

        debug!("Total libraries found: {}", sections.len());
        Ok(sections)
    }

    /// List every item of a library section
    ///
    /// Movie libraries answer with `Video` entries, show libraries with
    /// `Directory` entries; the caller matches on the returned variant.
    pub async fn list_items(&self, section_key: &str) -> Result<RawContainer> {
        let path = format!("/library/sections/{}/all", section_key.trim_matches('/'));
        self.get_container(&path, &[]).await
    }

    /// Fetch the full metadata of a single item, extras included
    ///
    /// Accepts either a bare rating key (`"42"`) or the item's `key`
    /// attribute (`"/library/metadata/42"`).
    pub async fn fetch_metadata(&self, item_key: &str) -> Result<RawContainer> {
        let id = item_key
            .strip_prefix(METADATA_PREFIX)
            .unwrap_or(item_key)
            .trim_matches('/');
        let path = format!("{}{}", METADATA_PREFIX, id);
        self.get_container(&path, &[("includeExtras", "1")]).await
    }

    /// GET a path below the base URL and decode the `<MediaContainer>` body
    async fn get_container(&self, path: &str, query: &[(&str, &str)]) -> Result<RawContainer> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/xml")
            .timeout(self.timeout);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlexError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        let container = RawContainer::from_xml(&body)?;

        debug!("Decoded {} entries from {}", container.len(), url);
        Ok(container)
    }
}

/// Builder for configuring a PlexClient
#[derive(Debug)]
pub struct ClientBuilder {
    client: Option<Client>,
    base_url: String,
    timeout: Duration,
    user_agent: String,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            client: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom HTTP client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the base URL of the Plex server
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the request timeout, raised to [`MIN_REQUEST_TIMEOUT`] if shorter
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(MIN_REQUEST_TIMEOUT);
        self
    }

    /// Set a custom User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the client
    ///
    /// Fails if the base URL is not an absolute http(s) URL.
    pub fn build(self) -> Result<PlexClient> {
        let parsed = Url::parse(self.base_url.trim())?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PlexError::Config(anyhow::anyhow!(
                "unsupported scheme '{}' in Plex URL {}",
                parsed.scheme(),
                self.base_url
            )));
        }

        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(&self.user_agent)
                .timeout(self.timeout)
                .build()?,
        };

        Ok(PlexClient {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::default();
        assert_eq!(builder.base_url, DEFAULT_BASE_URL);
        assert_eq!(
            builder.timeout,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = PlexClient::new("http://plex.lan:32400/").unwrap();
        assert_eq!(client.base_url(), "http://plex.lan:32400");

        let client = PlexClient::new("https://example.com/plex/").unwrap();
        assert_eq!(client.base_url(), "https://example.com/plex");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = PlexClient::new("not a url").unwrap_err();
        assert!(err.is_transport());

        let err = PlexClient::new("ftp://plex.lan").unwrap_err();
        assert!(matches!(err, PlexError::Config(_)));
    }

    #[test]
    fn test_custom_timeout() {
        let client = PlexClient::builder()
            .base_url("http://127.0.0.1:32400")
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_zero_timeout_is_raised() {
        let client = PlexClient::builder()
            .base_url("http://127.0.0.1:32400")
            .timeout(Duration::ZERO)
            .build()
            .unwrap();
        assert_eq!(client.timeout(), MIN_REQUEST_TIMEOUT);
    }
}
