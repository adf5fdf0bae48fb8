use std::io::Write;

use tracing::{info, warn};

use crate::events::{Item, PhotoReady};
use crate::pool::PhotoPool;

/// Receives each photo the updater selects.
///
/// A consumer owns the photo until it reports it deleted to the pool; the
/// file may disappear any time after that.
pub trait PhotoConsumer: Send {
    fn on_photo_ready(&mut self, photo: PhotoReady);

    /// Called once when the updater stops.
    fn on_shutdown(&mut self) {}
}

impl<F> PhotoConsumer for F
where
    F: FnMut(PhotoReady) + Send,
{
    fn on_photo_ready(&mut self, photo: PhotoReady) {
        self(photo)
    }
}

/// Writes the path of every shown photo to `out` and hands the previous one
/// back to the pool once it has been replaced.
pub struct Slideshow<W> {
    pool: PhotoPool,
    current: Option<Item>,
    shown: u64,
    out: W,
}

impl<W: Write + Send> Slideshow<W> {
    pub fn new(pool: PhotoPool, out: W) -> Self {
        Self {
            pool,
            current: None,
            shown: 0,
            out,
        }
    }

    pub fn current(&self) -> Option<&Item> {
        self.current.as_ref()
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }
}

impl<W: Write + Send> PhotoConsumer for Slideshow<W> {
    fn on_photo_ready(&mut self, photo: PhotoReady) {
        let PhotoReady { item } = photo;
        self.shown += 1;
        info!(id = %item.id, shown = self.shown, "displaying photo");
        if let Err(err) = writeln!(self.out, "{}", item.path.display()) {
            warn!("failed to write photo path: {err}");
        }
        if let Some(previous) = self.current.replace(item) {
            // The same photo can come around again after a re-download.
            if self.current.as_ref().is_some_and(|now| now.id != previous.id) {
                self.pool.delete(&previous.id);
            }
        }
    }

    fn on_shutdown(&mut self) {
        if let Some(current) = self.current.take() {
            self.pool.delete(&current.id);
        }
        let _ = self.out.flush();
    }
}
