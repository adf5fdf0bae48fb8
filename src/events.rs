use std::path::PathBuf;

/// A committed photo handed out by the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Base name of the download URL; also the cache file name.
    pub id: String,
    /// Absolute path of the committed file in the cache directory.
    pub path: PathBuf,
}

/// Where an identifier currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Download in flight (`<id>.part` on disk).
    Pending,
    /// Committed file, either in the inventory or handed out by `pop`.
    Committed,
    /// Marked for deletion; the file still exists and may be recycled.
    Trashed,
    /// No file and no bookkeeping left.
    Deleted,
}

/// Emitted by the updater each time it selects the next photo to show.
#[derive(Debug, Clone)]
pub struct PhotoReady {
    pub item: Item,
}

impl PhotoReady {
    pub fn path(&self) -> &std::path::Path {
        &self.item.path
    }
}
