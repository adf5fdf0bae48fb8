//! Bounded, self-replenishing photo cache.
//!
//! The pool keeps up to `capacity` committed photos ready in its cache
//! directory. A background worker (see [`worker`]) visits the registered
//! sources round-robin to refill it, and reclaims disk space from photos the
//! consumer has marked deleted once the pool is oversubscribed.
//!
//! Rules:
//! - A photo only becomes visible after its `.part` file is fully written and
//!   renamed (commit).
//! - `pop` hands each ready photo out at most once; the file stays on disk
//!   until the consumer calls `delete` and the worker reclaims it.
//! - When nothing is ready, the oldest trashed photo is recycled instead of
//!   leaving the display waiting on the network.

mod inventory;
mod worker;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use tokio::select;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::Error;
use crate::events::{Item, ItemState};
use crate::source::PhotoSource;
use inventory::{Inventory, TrashOutcome};

pub(crate) const PART_SUFFIX: &str = ".part";

/// Sizing and timing knobs for a [`PhotoPool`].
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub dir: PathBuf,
    pub capacity: usize,
    pub poll_quantum: Duration,
    pub failure_backoff: Duration,
}

impl PoolOptions {
    pub fn new(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            capacity,
            poll_quantum: Duration::from_millis(100),
            failure_backoff: Duration::from_secs(1),
        }
    }
}

/// Identifiers currently tracked by the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Ready photos, oldest commit first.
    pub inventory: Vec<String>,
    /// Trashed photos, oldest first.
    pub trash: Vec<String>,
}

struct PoolState {
    inventory: Inventory,
    rng: StdRng,
}

struct Shared {
    dir: PathBuf,
    poll_quantum: Duration,
    failure_backoff: Duration,
    state: Mutex<PoolState>,
    sources: Mutex<Vec<Arc<dyn PhotoSource>>>,
    /// Signalled when a photo becomes ready.
    added: Notify,
    /// Signalled when a ready photo is handed out.
    removed: Notify,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap to clone handle; all clones share one cache.
#[derive(Clone)]
pub struct PhotoPool {
    shared: Arc<Shared>,
}

impl PhotoPool {
    /// Prepare the cache directory and load what a previous run left behind.
    ///
    /// Orphaned `.part` files are removed. Committed files fill the inventory
    /// up to capacity; the rest go to the trash so the worker can reclaim them.
    pub fn open(options: PoolOptions, rng: StdRng) -> Result<Self, Error> {
        let PoolOptions {
            dir,
            capacity,
            poll_quantum,
            failure_backoff,
        } = options;

        std::fs::create_dir_all(&dir).map_err(|source| Error::CacheDir {
            path: dir.clone(),
            source,
        })?;
        let cached = scan_cache_dir(&dir)?;

        let mut inventory = Inventory::new(capacity);
        for id in cached {
            if inventory.is_full() {
                inventory.stash(id);
            } else {
                inventory.commit(id);
            }
        }
        info!(
            dir = %dir.display(),
            capacity,
            ready = inventory.len(),
            trashed = inventory.trash_len(),
            "photo pool opened"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                dir,
                poll_quantum,
                failure_backoff,
                state: Mutex::new(PoolState { inventory, rng }),
                sources: Mutex::new(Vec::new()),
                added: Notify::new(),
                removed: Notify::new(),
                cancel: CancellationToken::new(),
                worker: Mutex::new(None),
            }),
        })
    }

    /// Spawn the background worker on the current tokio runtime.
    pub fn start(&self) {
        let mut worker = lock(&self.shared.worker);
        if worker.is_some() {
            warn!("pool worker already started");
            return;
        }
        if self.is_stopped() {
            warn!("pool already stopped; not starting worker");
            return;
        }
        *worker = Some(tokio::spawn(worker::run(self.clone())));
    }

    /// Ask the worker to finish and wake every blocked `pop`. Idempotent.
    pub fn stop(&self) {
        if !self.shared.cancel.is_cancelled() {
            info!("stopping pool");
            self.shared.cancel.cancel();
        }
    }

    /// Wait for the worker to exit after [`stop`](Self::stop).
    pub async fn join(&self) {
        let handle = lock(&self.shared.worker).take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!("pool worker panicked: {err}");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Register another source; picked up by a running worker on its next turn.
    pub fn add_source(&self, source: Arc<dyn PhotoSource>) {
        let mut sources = lock(&self.shared.sources);
        info!(source = source.name(), position = sources.len(), "source added");
        sources.push(source);
    }

    pub fn source_count(&self) -> usize {
        lock(&self.shared.sources).len()
    }

    /// Take a random ready photo, waiting for one if necessary.
    ///
    /// Returns `None` once the pool is stopped or `timeout` elapses.
    pub async fn pop(&self, timeout: Option<Duration>) -> Option<Item> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let notified = self.shared.added.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_stopped() {
                return None;
            }
            if let Some(item) = self.try_pop() {
                return Some(item);
            }

            let mut wait = self.shared.poll_quantum;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    debug!("pop timed out with an empty pool");
                    return None;
                }
                wait = wait.min(deadline - now);
            }

            select! {
                _ = self.shared.cancel.cancelled() => return None,
                _ = notified.as_mut() => {}
                _ = sleep(wait) => {}
            }
        }
    }

    /// Non-blocking [`pop`](Self::pop); recycles from the trash when empty.
    pub fn try_pop(&self) -> Option<Item> {
        let id = {
            let mut guard = self.state();
            let state = &mut *guard;
            if let Some(id) = state.inventory.recycle() {
                debug!(%id, "recycling trashed photo");
            }
            state.inventory.take_random(&mut state.rng)?
        };
        self.shared.removed.notify_one();
        debug!(%id, "photo consumed");
        Some(self.item(id))
    }

    /// Mark a photo as no longer needed. The file is removed later by the
    /// worker, only once the pool holds more than `capacity` photos.
    pub fn delete(&self, id: &str) {
        if !is_valid_id(id) {
            warn!(%id, "ignoring delete of invalid identifier");
            return;
        }
        // Checked under the lock so a concurrent reclaim cannot remove the
        // file between the check and the trash insert.
        let mut state = self.state();
        if !self.path_for(id).exists() {
            debug!(%id, "delete: no such file; nothing to trash");
            return;
        }
        match state.inventory.trash(id) {
            TrashOutcome::Trashed => debug!(%id, "photo trashed"),
            TrashOutcome::AlreadyTrashed => debug!(%id, "photo already trashed"),
            TrashOutcome::StillReady => {
                debug!(%id, "photo was committed again; keeping it ready")
            }
        }
    }

    pub fn state_of(&self, id: &str) -> ItemState {
        {
            let state = self.state();
            if state.inventory.is_trashed(id) {
                return ItemState::Trashed;
            }
            if state.inventory.is_ready(id) {
                return ItemState::Committed;
            }
        }
        if !is_valid_id(id) {
            ItemState::Deleted
        } else if self.path_for(id).is_file() {
            ItemState::Committed
        } else if self.part_path_for(id).is_file() {
            ItemState::Pending
        } else {
            ItemState::Deleted
        }
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.state();
        PoolSnapshot {
            inventory: state.inventory.ready_ids(),
            trash: state.inventory.trash_ids(),
        }
    }

    pub fn len(&self) -> usize {
        self.state().inventory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn trash_len(&self) -> usize {
        self.state().inventory.trash_len()
    }

    pub fn capacity(&self) -> usize {
        self.state().inventory.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.state().inventory.is_full()
    }

    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.shared.dir.join(id)
    }

    fn part_path_for(&self, id: &str) -> PathBuf {
        self.shared.dir.join(format!("{id}{PART_SUFFIX}"))
    }

    fn item(&self, id: String) -> Item {
        Item {
            path: self.path_for(&id),
            id,
        }
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        lock(&self.shared.state)
    }

    /// Publish a renamed download. Returns `false` if it was already ready.
    fn commit(&self, id: &str) -> bool {
        let added = self.state().inventory.commit(id.to_owned());
        if added {
            self.shared.added.notify_waiters();
        }
        added
    }

    fn source_at(&self, cursor: usize) -> Option<(usize, Arc<dyn PhotoSource>)> {
        let sources = lock(&self.shared.sources);
        if sources.is_empty() {
            return None;
        }
        let idx = cursor % sources.len();
        Some((idx, Arc::clone(&sources[idx])))
    }

    /// Sleep up to `duration`, returning early on stop.
    async fn pause(&self, duration: Duration) {
        select! {
            _ = self.shared.cancel.cancelled() => {}
            _ = sleep(duration) => {}
        }
    }

    /// Wait up to one polling quantum for a ready photo to be handed out.
    async fn wait_for_slot(&self) {
        let notified = self.shared.removed.notified();
        if !self.is_full() {
            return;
        }
        select! {
            _ = self.shared.cancel.cancelled() => {}
            _ = notified => {}
            _ = sleep(self.shared.poll_quantum) => {}
        }
    }

    /// Remove trashed files while ready + trash exceeds capacity.
    ///
    /// Files are removed while the state lock is held; `delete` relies on it.
    fn reclaim(&self) {
        let mut state = self.state();
        for id in state.inventory.drain_reclaimable() {
            if let Err(err) = delete_if_exists(&self.path_for(&id)) {
                warn!(%id, "failed to delete trashed photo: {err}");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An identifier must name a plain file directly inside the cache directory.
pub(crate) fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.starts_with('.')
        && !id.ends_with(PART_SUFFIX)
        && !id.contains(['/', '\\'])
}

/// Committed file names in `dir`, sorted; orphaned downloads are deleted.
fn scan_cache_dir(dir: &Path) -> Result<Vec<String>, Error> {
    let mut committed = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| Error::CacheDir {
            path: dir.to_path_buf(),
            source: err.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            debug!(path = %entry.path().display(), "skipping non-utf8 file name");
            continue;
        };
        if name.ends_with(PART_SUFFIX) {
            info!(path = %entry.path().display(), "removing orphaned partial download");
            delete_if_exists(entry.path())?;
            continue;
        }
        if !is_valid_id(name) {
            debug!(path = %entry.path().display(), "skipping unrelated file");
            continue;
        }
        committed.push(name.to_owned());
    }
    Ok(committed)
}

fn delete_if_exists(p: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(p) {
        Ok(()) => {
            debug!(path = %p.display(), "delete: removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %p.display(), "delete: already gone; skipping");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
