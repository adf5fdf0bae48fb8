use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::config::UpdaterConfig;
use crate::consumer::PhotoConsumer;
use crate::events::PhotoReady;
use crate::pool::PhotoPool;

/// Pulls one photo per tick and hands it to `consumer`.
///
/// The display cadence is independent of the pool: a tick that finds no photo
/// within `pop-timeout` is skipped. Only cancellation ends the loop.
#[instrument(skip_all, fields(interval = ?cfg.interval))]
pub async fn run<C: PhotoConsumer>(
    pool: PhotoPool,
    cfg: UpdaterConfig,
    mut consumer: C,
    cancel: CancellationToken,
) {
    let mut ticker = interval(cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let pop_timeout = cfg.pop_timeout();

    loop {
        select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        debug!("updater: next photo");
        let popped = select! {
            _ = cancel.cancelled() => break,
            popped = pool.pop(Some(pop_timeout)) => popped,
        };
        match popped {
            Some(item) => consumer.on_photo_ready(PhotoReady { item }),
            None => debug!(stopped = pool.is_stopped(), "no photo ready; skipping tick"),
        }
    }

    consumer.on_shutdown();
    info!("updater stopped");
}

/// Handle to a spawned updater loop.
pub struct Updater {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Updater {
    pub fn start<C>(pool: PhotoPool, cfg: UpdaterConfig, consumer: C) -> Self
    where
        C: PhotoConsumer + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(pool, cfg, consumer, cancel.clone()));
        Self { cancel, handle }
    }

    /// No further ticks are scheduled after this returns.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            debug!("stopping updater");
            self.cancel.cancel();
        }
    }

    pub async fn join(self) {
        if let Err(err) = self.handle.await {
            error!("updater task panicked: {err}");
        }
    }
}
