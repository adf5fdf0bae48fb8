use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::pool::PoolOptions;
use crate::source::FlickrListing;

const DEFAULT_FLICKR_ENDPOINT: &str = "https://api.flickr.com/services/rest/";
const FLICKR_MAX_PER_PAGE: u32 = 500;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Directory holding committed photos and in-flight `.part` downloads.
    pub cache_dir: PathBuf,
    /// Number of photos the pool keeps ready.
    pub capacity: usize,
    /// Upper bound on every internal wait; stop requests are seen within it.
    #[serde(with = "humantime_serde")]
    pub poll_quantum: Duration,
    /// Pause after a failed fetch before the worker moves on.
    #[serde(with = "humantime_serde")]
    pub failure_backoff: Duration,
    /// Optional deterministic seed for photo and candidate selection.
    pub seed: Option<u64>,
    /// Display cadence.
    pub updater: UpdaterConfig,
    /// Flickr connection settings shared by every Flickr source.
    pub flickr: FlickrConfig,
    /// Listings to draw photos from, visited round-robin.
    pub sources: Vec<SourceConfig>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.cache_dir.as_os_str().is_empty(),
            "cache-dir must not be empty"
        );
        ensure!(self.capacity > 0, "capacity must be greater than zero");
        ensure!(
            !self.poll_quantum.is_zero(),
            "poll-quantum must be greater than zero"
        );
        self.updater
            .validate()
            .context("invalid updater configuration")?;
        self.flickr
            .validate(!self.sources.is_empty())
            .context("invalid flickr configuration")?;
        for (idx, source) in self.sources.iter().enumerate() {
            source
                .validate()
                .with_context(|| format!("invalid source #{idx}"))?;
        }
        Ok(self)
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            dir: self.cache_dir.clone(),
            capacity: self.capacity,
            poll_quantum: self.poll_quantum,
            failure_backoff: self.failure_backoff,
        }
    }

    fn default_cache_dir() -> PathBuf {
        let base = std::env::var_os("XDG_CACHE_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
            .unwrap_or_else(std::env::temp_dir);
        base.join("photo-saver")
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            cache_dir: Self::default_cache_dir(),
            capacity: 10,
            poll_quantum: Duration::from_millis(100),
            failure_backoff: Duration::from_secs(1),
            seed: None,
            updater: UpdaterConfig::default(),
            flickr: FlickrConfig::default(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct UpdaterConfig {
    /// Time between two photos.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// How long one tick waits for a photo before skipping; defaults to the interval.
    #[serde(with = "humantime_serde")]
    pub pop_timeout: Option<Duration>,
}

impl UpdaterConfig {
    pub fn pop_timeout(&self) -> Duration {
        self.pop_timeout.unwrap_or(self.interval)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            !self.interval.is_zero(),
            "updater.interval must be greater than zero"
        );
        ensure!(
            !self.pop_timeout().is_zero(),
            "updater.pop-timeout must be greater than zero"
        );
        Ok(())
    }
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            pop_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct FlickrConfig {
    pub api_key: String,
    pub endpoint: String,
    /// Listing page size (Flickr caps it at 500).
    pub per_page: u32,
    /// Maximum age of a cached listing before it is fetched again.
    #[serde(with = "humantime_serde")]
    pub refresh: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl FlickrConfig {
    fn validate(&self, in_use: bool) -> Result<()> {
        ensure!(
            (1..=FLICKR_MAX_PER_PAGE).contains(&self.per_page),
            "flickr.per-page must be between 1 and {FLICKR_MAX_PER_PAGE}"
        );
        ensure!(
            !self.request_timeout.is_zero(),
            "flickr.request-timeout must be greater than zero"
        );
        if in_use {
            ensure!(
                !self.api_key.trim().is_empty(),
                "flickr.api-key is required when sources are configured"
            );
            ensure!(
                reqwest::Url::parse(&self.endpoint).is_ok(),
                "flickr.endpoint is not a valid URL: {}",
                self.endpoint
            );
        }
        Ok(())
    }
}

impl Default for FlickrConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_FLICKR_ENDPOINT.to_owned(),
            per_page: FLICKR_MAX_PER_PAGE,
            refresh: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SourceConfig {
    Interestingness,
    Photostream {
        #[serde(rename = "user-id")]
        user_id: String,
    },
    Group {
        #[serde(rename = "group-id")]
        group_id: String,
    },
    Search {
        text: String,
        /// Only photos uploaded within this window.
        #[serde(default, rename = "max-age", with = "humantime_serde")]
        max_age: Option<Duration>,
    },
}

impl SourceConfig {
    pub fn to_listing(&self, now: DateTime<Utc>) -> FlickrListing {
        match self {
            Self::Interestingness => FlickrListing::Interestingness,
            Self::Photostream { user_id } => FlickrListing::Photostream {
                user_id: user_id.clone(),
            },
            Self::Group { group_id } => FlickrListing::Group {
                group_id: group_id.clone(),
            },
            Self::Search { text, max_age } => FlickrListing::Search {
                text: text.clone(),
                min_upload_date: (*max_age)
                    .and_then(|age| upload_cutoff(now, age))
                    .map(|cutoff| cutoff.timestamp()),
            },
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Interestingness => {}
            Self::Photostream { user_id } => {
                ensure!(!user_id.trim().is_empty(), "photostream user-id must not be empty")
            }
            Self::Group { group_id } => {
                ensure!(!group_id.trim().is_empty(), "group group-id must not be empty")
            }
            Self::Search { text, max_age } => {
                ensure!(!text.trim().is_empty(), "search text must not be empty");
                if let Some(age) = max_age {
                    ensure!(
                        upload_cutoff(Utc::now(), *age).is_some(),
                        "search max-age {} is out of range",
                        humantime::format_duration(*age)
                    );
                }
            }
        }
        Ok(())
    }
}

/// `now - age`, or `None` when the result is not a representable date.
fn upload_cutoff(now: DateTime<Utc>, age: Duration) -> Option<DateTime<Utc>> {
    let age = chrono::Duration::from_std(age).ok()?;
    now.checked_sub_signed(age)
}
