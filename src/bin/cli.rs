//! Event Crawler CLI
//!
//! Local execution entry point: one-shot runs, the scheduler daemon, and
//! read-only views over the store.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use event_crawler::{
    error::Result,
    models::{Config, RunStatus, TriggerKind},
    pipeline::{self, EventFilter, Pipeline, Scheduler, TriggerAck, TriggerOutcome},
    storage::{EventStore, LocalStore},
};
use serde::Serialize;

/// Event Crawler - Multi-platform Event Listing Collector
#[derive(Parser, Debug)]
#[command(
    name = "event-crawler",
    version,
    about = "Collects and deduplicates event listings across platforms"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the storage directory from the configuration
    #[arg(short, long)]
    storage_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline once and print the run record
    Run,

    /// Run the scheduler until interrupted (SIGHUP triggers a manual run)
    Serve {
        /// Fire the first run immediately
        #[arg(long)]
        run_now: bool,
    },

    /// Validate the configuration
    Validate,

    /// Print the effective configuration as TOML
    Config,

    /// Print dashboard data as JSON
    Dashboard,

    /// Query stored events
    Events {
        /// Case-insensitive city substring
        #[arg(long, default_value = "")]
        city: String,

        /// Platform name
        #[arg(long, default_value = "")]
        platform: String,

        /// Case-insensitive category substring
        #[arg(long, default_value = "")]
        category: String,

        /// Only free (true) or only paid (false) events
        #[arg(long)]
        is_free: Option<bool>,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Show store health and recent runs
    Info {
        /// Number of recent runs to show
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Wait for Ctrl-C, turning each SIGHUP into a manual trigger.
#[cfg(unix)]
async fn wait_for_shutdown(scheduler: &Scheduler) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => return Ok(res?),
            _ = hangup.recv() => match scheduler.trigger_manual() {
                TriggerAck::Accepted(_) => log::info!("Manual run triggered"),
                TriggerAck::AlreadyRunning => log::warn!("Manual trigger ignored: run in progress"),
            },
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_scheduler: &Scheduler) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config);
    config.apply_env_overrides();
    if let Some(dir) = cli.storage_dir {
        config.storage.dir = dir;
    }

    log::debug!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Run => {
            config.validate()?;
            let pipeline = Pipeline::from_config(&config)?;

            match pipeline.trigger(TriggerKind::Manual).await {
                TriggerOutcome::Completed(run) => {
                    print_json(&run)?;
                    if run.status == RunStatus::Failed {
                        log::error!("Run {} failed", run.id);
                        std::process::exit(1);
                    }
                }
                TriggerOutcome::AlreadyRunning => log::warn!("A run is already in progress"),
            }
        }

        Command::Serve { run_now } => {
            config.validate()?;
            let pipeline = Pipeline::from_config(&config)?;
            let mut scheduler = Scheduler::new(pipeline.clone(), config.pipeline.interval())
                .run_on_start(run_now || config.pipeline.run_on_start);

            scheduler.start();
            wait_for_shutdown(&scheduler).await?;

            log::info!("Shutting down...");
            scheduler.stop().await;
            pipeline.wait_idle().await;
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} cities, {} categories, {} sources)",
                config.pipeline.cities.len(),
                config.pipeline.categories.len(),
                config.sources.iter().filter(|s| s.enabled).count()
            );
        }

        Command::Config => {
            print!("{}", config.to_toml()?);
        }

        Command::Dashboard => {
            let store = LocalStore::new(&config.storage.dir);
            let view = pipeline::load_dashboard(&store, Utc::now().date_naive()).await?;
            print_json(&view)?;
        }

        Command::Events {
            city,
            platform,
            category,
            is_free,
            limit,
            offset,
        } => {
            let store = LocalStore::new(&config.storage.dir);
            let events = store.load_events().await?;
            let filter = EventFilter {
                city,
                platform,
                category,
                is_free,
                limit,
                offset,
            };
            print_json(&pipeline::filter_events(&events, &filter))?;
        }

        Command::Info { runs } => {
            let store = LocalStore::new(&config.storage.dir);
            log::info!("Storage directory: {}", config.storage.dir.display());

            let events = store.load_events().await?;
            log::info!("Canonical events: {}", events.len());

            match store.load_stats().await? {
                Some(stats) => log::info!("Stats updated: {}", stats.updated_at),
                None => log::info!("No stats written yet."),
            }

            let history = store.load_runs().await?;
            if history.is_empty() {
                log::info!("No runs recorded yet.");
            }
            for run in history.iter().rev().take(runs) {
                log::info!(
                    "Run {} [{}] {:?}: scraped {}, new {}, duplicates {}{}",
                    run.id,
                    run.trigger,
                    run.status,
                    run.counts.scraped,
                    run.counts.new,
                    run.counts.duplicates(),
                    run.error
                        .as_deref()
                        .map(|e| format!(" ({e})"))
                        .unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
