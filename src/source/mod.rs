//! Photo sources.
//!
//! A source produces one photo at a time: an identifier plus the bytes to
//! store under it. Concrete sources differ only in how they list candidate
//! photos; the HTTP download at the end is shared (`download`).

mod batch;
pub mod flickr;

pub use batch::{CandidateBatch, PhotoDescriptor};
pub use flickr::{FlickrApi, FlickrListing, FlickrSource};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::error::FetchError;

pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// One photo ready to be written into the cache.
pub struct FetchedPhoto {
    /// Cache file name; the base name of the download URL.
    pub id: String,
    /// Payload length announced by the remote, when known.
    pub expected_len: Option<u64>,
    pub body: ByteStream,
}

impl FetchedPhoto {
    /// A photo whose bytes are already in memory.
    pub fn from_bytes(id: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            id: id.into(),
            expected_len: Some(bytes.len() as u64),
            body: stream::once(async move { Ok(bytes) }).boxed(),
        }
    }
}

impl std::fmt::Debug for FetchedPhoto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedPhoto")
            .field("id", &self.id)
            .field("expected_len", &self.expected_len)
            .finish_non_exhaustive()
    }
}

/// Trait every photo source implements.
///
/// The pool worker calls [`fetch_one`](PhotoSource::fetch_one) outside of
/// any inventory lock, so implementations may take as long as the network
/// needs. Errors are logged by the worker and never stop it.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Human-readable label used in logs.
    fn name(&self) -> &str;

    /// Produce the next photo.
    async fn fetch_one(&self) -> Result<FetchedPhoto, FetchError>;
}

/// Start downloading `url`; the body is streamed by the caller.
pub async fn download(client: &reqwest::Client, url: &str) -> Result<FetchedPhoto, FetchError> {
    let id = id_from_url(url).ok_or_else(|| FetchError::InvalidId(url.to_owned()))?;
    debug!(%url, %id, "downloading");

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::upstream(format!("GET {url}: HTTP {status}")));
    }

    Ok(FetchedPhoto {
        id,
        expected_len: response.content_length(),
        body: response.bytes_stream().map_err(FetchError::from).boxed(),
    })
}

/// Base name of the URL path, ignoring query and fragment.
pub fn id_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .next_back()
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
}
