//! Flickr REST listings.
//!
//! Every listing method returns the same photo page shape; the variants only
//! differ in method name and filter parameters.

use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::{SeedableRng, rngs::StdRng};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{CandidateBatch, FetchedPhoto, PhotoDescriptor, PhotoSource, download};
use crate::config::FlickrConfig;
use crate::error::FetchError;

const EXTRAS: &str = "url_o,url_l,url_m,url_s";

/// Connection settings shared by every Flickr source.
#[derive(Debug, Clone)]
pub struct FlickrApi {
    client: Client,
    endpoint: String,
    api_key: String,
    per_page: u32,
}

impl FlickrApi {
    pub fn new(cfg: &FlickrConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.request_timeout)
            .user_agent(concat!("rust-photo-saver/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
            per_page: cfg.per_page,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetch one page of candidates for `listing`.
    pub async fn list(&self, listing: &FlickrListing) -> Result<Vec<PhotoDescriptor>, FetchError> {
        let mut query: Vec<(&str, String)> = vec![
            ("method", listing.method().to_owned()),
            ("api_key", self.api_key.clone()),
            ("extras", EXTRAS.to_owned()),
            ("per_page", self.per_page.to_string()),
            ("format", "json".to_owned()),
            ("nojsoncallback", "1".to_owned()),
        ];
        query.extend(listing.params());

        let response = self.client.get(&self.endpoint).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::upstream(format!(
                "{}: HTTP {}: {}",
                listing.method(),
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        let page: ListResponse = response
            .json()
            .await
            .map_err(|e| FetchError::upstream(format!("failed to parse listing: {e}")))?;
        page.into_descriptors()
    }
}

/// Which remote list a source draws from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlickrListing {
    /// Trending photos of the last days.
    Interestingness,
    /// Public photos of one account.
    Photostream { user_id: String },
    /// A group's photo pool.
    Group { group_id: String },
    /// Full-text search, optionally limited to recent uploads (unix seconds).
    Search {
        text: String,
        min_upload_date: Option<i64>,
    },
}

impl FlickrListing {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Interestingness => "flickr.interestingness.getList",
            Self::Photostream { .. } => "flickr.people.getPublicPhotos",
            Self::Group { .. } => "flickr.groups.pools.getPhotos",
            Self::Search { .. } => "flickr.photos.search",
        }
    }

    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Interestingness => Vec::new(),
            Self::Photostream { user_id } => vec![("user_id", user_id.clone())],
            Self::Group { group_id } => vec![("group_id", group_id.clone())],
            Self::Search {
                text,
                min_upload_date,
            } => {
                let mut params = vec![("text", text.clone()), ("sort", "interestingness-desc".into())];
                if let Some(ts) = min_upload_date {
                    params.push(("min_upload_date", ts.to_string()));
                }
                params
            }
        }
    }
}

impl fmt::Display for FlickrListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interestingness => f.write_str("interestingness"),
            Self::Photostream { user_id } => write!(f, "photostream({user_id})"),
            Self::Group { group_id } => write!(f, "group({group_id})"),
            Self::Search { text, .. } => write!(f, "search({text:?})"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    stat: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    photos: Option<PhotoPage>,
}

#[derive(Debug, Deserialize)]
struct PhotoPage {
    #[serde(default)]
    photo: Vec<PhotoDescriptor>,
}

impl ListResponse {
    fn into_descriptors(self) -> Result<Vec<PhotoDescriptor>, FetchError> {
        if self.stat != "ok" {
            return Err(FetchError::upstream(format!(
                "flickr error {}: {}",
                self.code.unwrap_or_default(),
                self.message.unwrap_or_else(|| "unknown failure".into())
            )));
        }
        Ok(self.photos.map(|p| p.photo).unwrap_or_default())
    }
}

struct BatchState {
    batch: CandidateBatch,
    rng: StdRng,
}

/// A source that draws random photos from one Flickr listing and refreshes
/// the listing once it is used up or older than `refresh`.
pub struct FlickrSource {
    api: FlickrApi,
    listing: FlickrListing,
    label: String,
    refresh: Duration,
    state: Mutex<BatchState>,
}

impl FlickrSource {
    pub fn new(api: FlickrApi, listing: FlickrListing, refresh: Duration) -> Self {
        Self::with_rng(api, listing, refresh, StdRng::from_os_rng())
    }

    pub fn with_rng(api: FlickrApi, listing: FlickrListing, refresh: Duration, rng: StdRng) -> Self {
        Self {
            label: listing.to_string(),
            api,
            listing,
            refresh,
            state: Mutex::new(BatchState {
                batch: CandidateBatch::default(),
                rng,
            }),
        }
    }

    pub fn listing(&self) -> &FlickrListing {
        &self.listing
    }

    async fn next_url(&self) -> Result<String, FetchError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.batch.needs_refresh(self.refresh, Instant::now()) {
            debug!(source = %self.label, "downloading list");
            let descriptors = self.api.list(&self.listing).await?;
            info!(source = %self.label, candidates = descriptors.len(), "listing refreshed");
            state.batch.replace(descriptors, Instant::now());
        }
        state
            .batch
            .pick(&mut state.rng)
            .map(|(_, url)| url)
            .ok_or_else(|| FetchError::NoCandidate(self.label.clone()))
    }
}

#[async_trait]
impl PhotoSource for FlickrSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch_one(&self) -> Result<FetchedPhoto, FetchError> {
        let url = self.next_url().await?;
        download(self.api.client(), &url).await
    }
}
