mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedSource, open_pool};
use rust_photo_saver::config::UpdaterConfig;
use rust_photo_saver::consumer::Slideshow;
use rust_photo_saver::events::{ItemState, PhotoReady};
use rust_photo_saver::tasks::updater::{self, Updater};
use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn cadence(interval_ms: u64, pop_timeout_ms: u64) -> UpdaterConfig {
    UpdaterConfig {
        interval: Duration::from_millis(interval_ms),
        pop_timeout: Some(Duration::from_millis(pop_timeout_ms)),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn updater_hands_each_tick_to_consumer() {
    let tmp = tempdir().unwrap();
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        fs::write(tmp.path().join(name), b"x").unwrap();
    }
    let pool = open_pool(tmp.path(), 3);
    let (tx, mut rx) = mpsc::unbounded_channel::<PhotoReady>();
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(updater::run(
        pool.clone(),
        cadence(50, 20),
        move |photo: PhotoReady| {
            let _ = tx.send(photo);
        },
        cancel.clone(),
    ));

    let mut ids = Vec::new();
    while ids.len() < 3 {
        let photo = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timeout waiting for photo")
            .expect("updater channel closed");
        assert!(photo.path().is_file());
        ids.push(photo.item.id);
    }
    ids.sort();
    assert_eq!(ids, vec!["a.jpg", "b.jpg", "c.jpg"]);

    cancel.cancel();
    tokio::time::timeout(Duration::from_millis(500), handle)
        .await
        .expect("updater did not stop")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_ticks_are_skipped_until_photos_arrive() {
    let tmp = tempdir().unwrap();
    let pool = open_pool(tmp.path(), 2);
    pool.start();
    let (tx, mut rx) = mpsc::unbounded_channel::<PhotoReady>();
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(updater::run(
        pool.clone(),
        cadence(30, 10),
        move |photo: PhotoReady| {
            let _ = tx.send(photo);
        },
        cancel.clone(),
    ));

    let early = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(early.is_err(), "no photo should be shown from an empty pool");
    assert!(!handle.is_finished(), "updater must keep ticking");

    pool.add_source(Arc::new(ScriptedSource::succeeding("late")));
    let photo = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout waiting for first photo")
        .expect("updater channel closed");
    assert!(photo.path().is_file());

    cancel.cancel();
    let _ = handle.await;
    pool.stop();
    pool.join().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_interrupts_a_long_pop() {
    let tmp = tempdir().unwrap();
    let pool = open_pool(tmp.path(), 2);
    let updater = Updater::start(pool.clone(), cadence(10, 60_000), |_photo: PhotoReady| {});

    tokio::time::sleep(Duration::from_millis(50)).await;
    updater.stop();
    tokio::time::timeout(Duration::from_millis(500), updater.join())
        .await
        .expect("updater kept waiting on the pool after stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slideshow_hands_shown_photos_back() {
    let tmp = tempdir().unwrap();
    let pool = open_pool(tmp.path(), 2);
    let source = Arc::new(ScriptedSource::succeeding("fast"));
    pool.add_source(source.clone());
    pool.start();

    let updater = Updater::start(
        pool.clone(),
        cadence(30, 1_000),
        Slideshow::new(pool.clone(), Vec::new()),
    );

    tokio::time::sleep(Duration::from_millis(400)).await;
    updater.stop();
    updater.join().await;
    pool.stop();
    pool.join().await;

    assert!(source.calls() > 4, "slideshow barely advanced");

    // Nothing shown is leaked: every file on disk is still tracked by the pool.
    let snap = pool.snapshot();
    for id in &snap.trash {
        assert_eq!(pool.state_of(id), ItemState::Trashed);
    }
    let on_disk = fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| !entry.file_name().to_string_lossy().ends_with(".part"))
        .count();
    assert_eq!(on_disk, snap.inventory.len() + snap.trash.len(), "{snap:?}");
}
