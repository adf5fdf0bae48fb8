use std::collections::VecDeque;

use rand::Rng;

/// Bookkeeping for committed photos: the ready set and the trash queue.
///
/// Holds identifiers only; the pool owns the files. An identifier lives in at
/// most one of the two collections.
#[derive(Debug)]
pub(crate) struct Inventory {
    capacity: usize,
    ready: Vec<String>,
    trash: VecDeque<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrashOutcome {
    Trashed,
    AlreadyTrashed,
    /// The identifier was re-committed after it was handed out; it stays ready.
    StillReady,
}

impl Inventory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ready: Vec::with_capacity(capacity),
            trash: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn trash_len(&self) -> usize {
        self.trash.len()
    }

    pub fn is_full(&self) -> bool {
        self.ready.len() >= self.capacity
    }

    pub fn is_ready(&self, id: &str) -> bool {
        self.ready.iter().any(|r| r == id)
    }

    pub fn is_trashed(&self, id: &str) -> bool {
        self.trash.iter().any(|t| t == id)
    }

    /// Make a committed identifier available. Returns `false` when it was
    /// already ready. A trashed identifier is pulled back out of the trash.
    pub fn commit(&mut self, id: String) -> bool {
        if self.is_ready(&id) {
            return false;
        }
        self.trash.retain(|t| *t != id);
        self.ready.push(id);
        true
    }

    /// Park an identifier in the trash without ever having been ready, used
    /// for cached files beyond capacity at startup.
    pub fn stash(&mut self, id: String) {
        if !self.is_ready(&id) && !self.is_trashed(&id) {
            self.trash.push_back(id);
        }
    }

    /// When nothing is ready, move the oldest trashed identifier back.
    pub fn recycle(&mut self) -> Option<String> {
        if !self.ready.is_empty() {
            return None;
        }
        let id = self.trash.pop_front()?;
        self.ready.push(id.clone());
        Some(id)
    }

    /// Remove and return a uniformly random ready identifier.
    pub fn take_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<String> {
        if self.ready.is_empty() {
            return None;
        }
        let idx = rng.random_range(0..self.ready.len());
        Some(self.ready.remove(idx))
    }

    pub fn trash(&mut self, id: &str) -> TrashOutcome {
        if self.is_trashed(id) {
            TrashOutcome::AlreadyTrashed
        } else if self.is_ready(id) {
            TrashOutcome::StillReady
        } else {
            self.trash.push_back(id.to_owned());
            TrashOutcome::Trashed
        }
    }

    /// Pop trashed identifiers, newest first, until ready + trash fits the
    /// capacity. The caller removes the files.
    pub fn drain_reclaimable(&mut self) -> Vec<String> {
        let mut doomed = Vec::new();
        while self.ready.len() + self.trash.len() > self.capacity {
            match self.trash.pop_back() {
                Some(id) => doomed.push(id),
                None => break,
            }
        }
        doomed
    }

    pub fn ready_ids(&self) -> Vec<String> {
        self.ready.clone()
    }

    pub fn trash_ids(&self) -> Vec<String> {
        self.trash.iter().cloned().collect()
    }
}
