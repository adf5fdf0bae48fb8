//! Binary entrypoint for the photo saver.
//!
//! Wires the configured sources into a pool and prints each photo path as it
//! comes up for display. Rendering is left to whatever reads stdout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{ArgAction, Parser};
use rand::{SeedableRng, rngs::StdRng};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use rust_photo_saver::config::{Configuration, SourceConfig};
use rust_photo_saver::consumer::Slideshow;
use rust_photo_saver::pool::PhotoPool;
use rust_photo_saver::source::{FlickrApi, FlickrSource};
use rust_photo_saver::tasks::updater::Updater;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Parser)]
#[command(
    name = "photo-saver",
    version,
    about = "A screensaver for Flickr enthusiasts"
)]
struct Cli {
    /// Path to YAML config file
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Show photos from a user's photostream (repeatable)
    #[arg(short = 'u', long = "user", value_name = "USER_ID")]
    users: Vec<String>,

    /// Show photos from a group's pool (repeatable)
    #[arg(short = 'g', long = "group", value_name = "GROUP_ID")]
    groups: Vec<String>,

    /// Show interesting photos from the last days
    #[arg(short = 'i', long)]
    interesting: bool,

    /// Show photos matching a full-text search (repeatable)
    #[arg(short = 's', long = "search", value_name = "TEXT")]
    searches: Vec<String>,

    /// Only search photos newer than the specified number of days
    #[arg(short = 'd', long, value_name = "DAYS")]
    days: Option<u64>,

    /// Override the time between photos (e.g. "8s")
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Override the Flickr API key
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,

    /// Deterministic RNG seed for photo selection
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Fold command-line overrides and sources into the loaded configuration.
    fn apply(&self, cfg: &mut Configuration) -> Result<()> {
        if let Some(interval) = self.interval {
            cfg.updater.interval = interval;
        }
        if let Some(key) = &self.api_key {
            cfg.flickr.api_key = key.clone();
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }

        let max_age = match self.days {
            Some(days) => Some(
                days.checked_mul(SECS_PER_DAY)
                    .map(Duration::from_secs)
                    .with_context(|| format!("--days {days} is out of range"))?,
            ),
            None => None,
        };
        cfg.sources.extend(
            self.users
                .iter()
                .map(|user_id| SourceConfig::Photostream {
                    user_id: user_id.clone(),
                })
                .chain(self.groups.iter().map(|group_id| SourceConfig::Group {
                    group_id: group_id.clone(),
                }))
                .chain(self.searches.iter().map(|text| SourceConfig::Search {
                    text: text.clone(),
                    max_age,
                })),
        );

        let has_interesting = cfg.sources.contains(&SourceConfig::Interestingness);
        if (self.interesting || cfg.sources.is_empty()) && !has_interesting {
            cfg.sources.push(SourceConfig::Interestingness);
        }
        Ok(())
    }
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("rust_photo_saver={level}").parse()?)
        .add_directive(format!("photo_saver={level}").parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("hyper_util=warn".parse()?);
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();
    Ok(())
}

fn seeded_rng(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
        None => StdRng::from_os_rng(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut cfg = match &cli.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    cli.apply(&mut cfg)?;
    let cfg = cfg.validated().context("invalid configuration values")?;
    debug!(
        cache_dir = %cfg.cache_dir.display(),
        capacity = cfg.capacity,
        sources = ?cfg.sources,
        "configuration loaded"
    );

    let pool = PhotoPool::open(cfg.pool_options(), seeded_rng(cfg.seed, 0))
        .context("failed to initialise photo cache")?;
    let api = FlickrApi::new(&cfg.flickr)?;
    let now = Utc::now();
    for (idx, source) in cfg.sources.iter().enumerate() {
        let listing = source.to_listing(now);
        pool.add_source(Arc::new(FlickrSource::with_rng(
            api.clone(),
            listing,
            cfg.flickr.refresh,
            seeded_rng(cfg.seed, idx as u64 + 1),
        )));
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    if sigterm.recv().await.is_some() {
                        info!("SIGTERM received; initiating shutdown");
                        cancel.cancel();
                    }
                }
                Err(err) => warn!("failed to register SIGTERM handler: {err}"),
            }
        });
    }

    pool.start();
    let updater = Updater::start(
        pool.clone(),
        cfg.updater.clone(),
        Slideshow::new(pool.clone(), std::io::stdout()),
    );

    cancel.cancelled().await;

    updater.stop();
    pool.stop();
    updater.join().await;
    pool.join().await;
    info!("bye");
    Ok(())
}
