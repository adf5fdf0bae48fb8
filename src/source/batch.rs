use std::time::{Duration, Instant};

use rand::Rng;
use serde::Deserialize;

/// One entry of a remote listing, carrying the download URLs it offers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PhotoDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub url_o: Option<String>,
    #[serde(default)]
    pub url_l: Option<String>,
    #[serde(default)]
    pub url_m: Option<String>,
    #[serde(default)]
    pub url_s: Option<String>,
}

impl PhotoDescriptor {
    /// Best available URL: original, then large, medium, small.
    pub fn best_url(&self) -> Option<&str> {
        [&self.url_o, &self.url_l, &self.url_m, &self.url_s]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|url| !url.is_empty())
    }
}

/// Cached listing page that candidates are drawn from without replacement.
#[derive(Debug, Default)]
pub struct CandidateBatch {
    descriptors: Vec<PhotoDescriptor>,
    fetched_at: Option<Instant>,
}

impl CandidateBatch {
    pub fn replace(&mut self, descriptors: Vec<PhotoDescriptor>, now: Instant) {
        self.descriptors = descriptors;
        self.fetched_at = Some(now);
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Empty or older than `ttl`.
    pub fn needs_refresh(&self, ttl: Duration, now: Instant) -> bool {
        match self.fetched_at {
            Some(at) if !self.descriptors.is_empty() => now.saturating_duration_since(at) >= ttl,
            _ => true,
        }
    }

    /// Draw random descriptors until one has a usable URL. Descriptors without
    /// one are dropped. Returns `(descriptor id, url)`, or `None` once the
    /// batch is exhausted.
    pub fn pick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<(String, String)> {
        while !self.descriptors.is_empty() {
            let idx = rng.random_range(0..self.descriptors.len());
            let candidate = self.descriptors.swap_remove(idx);
            match candidate.best_url() {
                Some(url) => return Some((candidate.id.clone(), url.to_owned())),
                None => {
                    tracing::warn!(photo = %candidate.id, "no suitable URL found for photo");
                }
            }
        }
        None
    }
}
