use std::path::Path;

use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::select;
use tracing::{debug, info, instrument, warn};

use super::{PhotoPool, delete_if_exists, is_valid_id};
use crate::error::FetchError;
use crate::events::Item;
use crate::source::{FetchedPhoto, PhotoSource};

/// Keeps the pool topped up until it is stopped.
///
/// Each turn either waits for a free slot, or asks the next source (round
/// robin, advancing whether or not the fetch succeeds) for one photo. Failures
/// are logged and followed by a back-off; they never end the loop. Every turn
/// ends with trash reclamation.
#[instrument(skip_all, fields(dir = %pool.dir().display()))]
pub(super) async fn run(pool: PhotoPool) {
    let cancel = pool.shared.cancel.clone();
    let mut cursor = 0usize;
    info!("pool worker started");

    while !cancel.is_cancelled() {
        if pool.is_full() {
            pool.wait_for_slot().await;
        } else if let Some((idx, source)) = pool.source_at(cursor) {
            let outcome = select! {
                _ = cancel.cancelled() => None,
                res = fetch_and_commit(&pool, source.as_ref()) => Some(res),
            };
            match outcome {
                None => debug!(source = source.name(), "fetch abandoned on stop"),
                Some(Ok(item)) => {
                    info!(source = source.name(), id = %item.id, ready = pool.len(), "photo committed")
                }
                Some(Err(err)) => {
                    warn!(source = source.name(), "source failed: {err}");
                    pool.pause(pool.shared.failure_backoff).await;
                }
            }
            cursor = idx + 1;
        } else {
            debug!("no sources registered; idling");
            pool.pause(pool.shared.poll_quantum).await;
        }

        pool.reclaim();
    }

    info!("pool worker stopped");
}

/// Fetch one photo, stage it as `<id>.part`, then rename it into place and
/// publish it. The partial file never survives a failure.
async fn fetch_and_commit(pool: &PhotoPool, source: &dyn PhotoSource) -> Result<Item, FetchError> {
    let fetched = source.fetch_one().await?;
    let id = fetched.id.clone();
    if !is_valid_id(&id) {
        return Err(FetchError::InvalidId(id));
    }

    let part = pool.part_path_for(&id);
    let target = pool.path_for(&id);
    debug!(%id, part = %part.display(), "staging download");

    let staged = match write_part(&part, fetched).await {
        Ok(written) => fs::rename(&part, &target)
            .await
            .map(|()| written)
            .map_err(FetchError::from),
        Err(err) => Err(err),
    };
    let written = match staged {
        Ok(written) => written,
        Err(err) => {
            if let Err(cleanup) = delete_if_exists(&part) {
                warn!(%id, "failed to remove partial download: {cleanup}");
            }
            return Err(err);
        }
    };

    if !pool.commit(&id) {
        debug!(%id, bytes = written, "photo already ready; refreshed file only");
    }
    Ok(pool.item(id))
}

/// Stream the payload into `path`, checking it against the announced length.
async fn write_part(path: &Path, fetched: FetchedPhoto) -> Result<u64, FetchError> {
    let FetchedPhoto {
        id,
        expected_len,
        mut body,
    } = fetched;

    let mut file = File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;

    match expected_len {
        Some(expected) if expected != written => Err(FetchError::PartialWrite {
            id,
            written,
            expected,
        }),
        _ => Ok(written),
    }
}
