//! Error types for the Plex client and library cache

use std::path::PathBuf;

/// Result type alias for pmoplex operations
pub type Result<T> = std::result::Result<T, PlexError>;

/// Errors that can occur while fetching, normalizing or caching Plex libraries
#[derive(Debug, thiserror::Error)]
pub enum PlexError {
    /// Network failure or timeout while talking to the Plex server
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The Plex server answered with a non-success status
    #[error("Plex server returned {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// The configured base URL cannot be parsed
    #[error("Invalid Plex URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The XML payload could not be decoded
    #[error("XML decoding failed: {0}")]
    Decode(#[from] quick_xml::de::DeError),

    /// The XML payload decoded but does not have the expected shape
    #[error("Unexpected XML shape: {0}")]
    UnexpectedShape(String),

    /// Reading or writing the persisted snapshot failed
    #[error("Snapshot I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted snapshot exists but is not valid JSON
    #[error("Corrupt snapshot {path}: {source}")]
    CorruptSnapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No snapshot was ever persisted
    #[error("No persisted snapshot at {0}")]
    NoSnapshot(PathBuf),

    /// The store keeps its snapshot in memory only
    #[error("Snapshot store has no persistence configured")]
    NotPersistent,

    /// Configuration error (from pmoconfig/anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}

impl PlexError {
    /// Create an unexpected-shape decode error
    pub fn unexpected_shape(msg: impl Into<String>) -> Self {
        Self::UnexpectedShape(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Failure talking to the remote server (network, timeout, bad status)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::HttpStatus { .. } | Self::InvalidUrl(_)
        )
    }

    /// Malformed or unexpected XML
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::UnexpectedShape(_))
    }

    /// Disk read/write/corruption of the persisted snapshot
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::CorruptSnapshot { .. }
                | Self::NoSnapshot(_)
                | Self::NotPersistent
        )
    }
}
