#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::{SeedableRng, rngs::StdRng};
use rust_photo_saver::error::FetchError;
use rust_photo_saver::pool::{PhotoPool, PoolOptions};
use rust_photo_saver::source::{FetchedPhoto, PhotoSource};
use tokio::sync::Semaphore;

pub const QUANTUM: Duration = Duration::from_millis(20);

pub fn open_pool(dir: &Path, capacity: usize) -> PhotoPool {
    let options = PoolOptions {
        poll_quantum: QUANTUM,
        failure_backoff: QUANTUM,
        ..PoolOptions::new(dir, capacity)
    };
    PhotoPool::open(options, StdRng::seed_from_u64(0x5EED)).expect("open pool")
}

/// "a", "b", … "z", then "p26", "p27", …
pub fn id_for(n: usize) -> String {
    if n < 26 {
        ((b'a' + n as u8) as char).to_string()
    } else {
        format!("p{n}")
    }
}

/// Source with scripted behaviour and a call log shared across sources.
pub struct ScriptedSource {
    name: String,
    prefix: String,
    fail: bool,
    calls: AtomicUsize,
    gate: Option<Semaphore>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSource {
    /// Always succeeds with ids "a", "b", "c", …
    pub fn succeeding(name: &str) -> Self {
        Self::build(name, "", false, None)
    }

    /// Always fails with an upstream error.
    pub fn failing(name: &str) -> Self {
        Self::build(name, "", true, None)
    }

    /// Succeeds once per permit handed out through [`release`](Self::release).
    pub fn gated(name: &str) -> Self {
        Self::build(name, "", false, Some(Semaphore::new(0)))
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_owned();
        self
    }

    pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = log;
        self
    }

    fn build(name: &str, prefix: &str, fail: bool, gate: Option<Semaphore>) -> Self {
        Self {
            name: name.to_owned(),
            prefix: prefix.to_owned(),
            fail,
            calls: AtomicUsize::new(0),
            gate,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhotoSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_one(&self) -> Result<FetchedPhoto, FetchError> {
        self.log.lock().unwrap().push(self.name.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::upstream(format!("{} is down", self.name)));
        }
        let id = format!("{}{}", self.prefix, id_for(n));
        Ok(FetchedPhoto::from_bytes(id.clone(), id.into_bytes()))
    }
}

/// Poll `check` until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
