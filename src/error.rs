use std::path::PathBuf;

use thiserror::Error;

/// Library error type for pool construction.
#[derive(Debug, Error)]
pub enum Error {
    /// The cache directory could not be created or read.
    #[error("cache directory {} is unusable: {source}", path.display())]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure while fetching a single photo from a source.
///
/// Every variant is recovered by the pool worker; none of them reach the
/// consumer.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The remote listing or download request failed.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// The listing held no descriptor with a usable download URL.
    #[error("no usable candidate in listing from {0}")]
    NoCandidate(String),

    /// The download stream ended before the full payload arrived.
    #[error("download of {id} ended after {written} bytes (expected {expected})")]
    PartialWrite {
        id: String,
        written: u64,
        expected: u64,
    },

    /// The source produced an identifier that cannot name a cache file.
    #[error("invalid photo identifier {0:?}")]
    InvalidId(String),

    /// Local IO failure while staging the download.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Upstream(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Self::Upstream(format!("connection failed: {err}"))
        } else {
            Self::Upstream(err.to_string())
        }
    }
}
