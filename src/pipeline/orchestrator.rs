// src/pipeline/orchestrator.rs

//! Single-flight pipeline runs.
//!
//! A run walks collect, dedupe, upsert, stats, log. At most one run is in
//! flight per store; a trigger that arrives meanwhile is rejected, not
//! queued. The in-process gate covers clones of one [`Pipeline`], and the
//! store's run lease covers other processes sharing the same storage.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::models::{Config, PipelineRun, RunStatus, StoredStats, TriggerKind};
use crate::pipeline::{Deduplicator, StatsAggregator};
use crate::services::{ScraperRegistry, SourceCollector};
use crate::storage::{BatchWriter, EventStore, LocalStore, RetryPolicy, RunLease, with_retry};

/// Result of [`Pipeline::trigger`].
#[derive(Debug)]
pub enum TriggerOutcome {
    Completed(PipelineRun),
    AlreadyRunning,
}

/// Result of [`Pipeline::spawn_trigger`].
#[derive(Debug)]
pub enum TriggerAck {
    Accepted(JoinHandle<PipelineRun>),
    AlreadyRunning,
}

impl TriggerAck {
    pub fn is_accepted(&self) -> bool {
        matches!(self, TriggerAck::Accepted(_))
    }
}

/// In-process gate plus the store's cross-process lease, held for one run.
type RunPermit = (OwnedMutexGuard<()>, RunLease);

struct Inner {
    targets: Vec<(String, String)>,
    registry: ScraperRegistry,
    collector: SourceCollector,
    dedup: Deduplicator,
    store: Arc<dyn EventStore>,
    writer: BatchWriter,
    retry: RetryPolicy,
    gate: Arc<Mutex<()>>,
    last_run: RwLock<Option<PipelineRun>>,
}

/// Orchestrates collection, deduplication, and persistence.
///
/// Cheap to clone; clones share the run gate.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    pub fn new(config: &Config, registry: ScraperRegistry, store: Arc<dyn EventStore>) -> Self {
        let writer = BatchWriter::from_config(Arc::clone(&store), &config.storage);
        Self {
            inner: Arc::new(Inner {
                targets: config.pipeline.targets(),
                registry,
                collector: SourceCollector::from_config(&config.collector),
                dedup: Deduplicator::new(config.dedup.fuzzy_threshold),
                retry: *writer.policy(),
                store,
                writer,
                gate: Arc::new(Mutex::new(())),
                last_run: RwLock::new(None),
            }),
        }
    }

    /// Pipeline over the local JSON store and the configured sources.
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = ScraperRegistry::from_config(config)?;
        let store = Arc::new(LocalStore::new(&config.storage.dir));
        Ok(Self::new(config, registry, store))
    }

    /// Run now and wait for the result, unless a run is in flight.
    pub async fn trigger(&self, kind: TriggerKind) -> TriggerOutcome {
        match self.try_acquire(kind) {
            Some(permit) => {
                let run = self.inner.execute(kind).await;
                drop(permit);
                TriggerOutcome::Completed(run)
            }
            None => TriggerOutcome::AlreadyRunning,
        }
    }

    /// Claim the gate now and run in the background.
    pub fn spawn_trigger(&self, kind: TriggerKind) -> TriggerAck {
        match self.try_acquire(kind) {
            Some(permit) => {
                let inner = Arc::clone(&self.inner);
                TriggerAck::Accepted(tokio::spawn(async move {
                    let run = inner.execute(kind).await;
                    drop(permit);
                    run
                }))
            }
            None => TriggerAck::AlreadyRunning,
        }
    }

    /// Whether a run of this process is in flight.
    pub fn is_running(&self) -> bool {
        self.inner.gate.try_lock().is_err()
    }

    /// The most recently finished run of this process.
    pub async fn last_run(&self) -> Option<PipelineRun> {
        self.inner.last_run.read().await.clone()
    }

    /// Wait for the in-flight run, if any, to finish.
    pub async fn wait_idle(&self) {
        let _guard = self.inner.gate.lock().await;
    }

    fn try_acquire(&self, kind: TriggerKind) -> Option<RunPermit> {
        let Ok(gate) = Arc::clone(&self.inner.gate).try_lock_owned() else {
            log::info!("{kind} trigger skipped: a run is already in progress");
            return None;
        };

        match self.inner.store.try_lease() {
            Ok(Some(lease)) => Some((gate, lease)),
            Ok(None) => {
                log::info!("{kind} trigger skipped: another process is running against the store");
                None
            }
            Err(e) => {
                log::warn!("Could not take the store run lock ({e}); running without it");
                Some((gate, RunLease::unguarded()))
            }
        }
    }
}

impl Inner {
    async fn execute(&self, kind: TriggerKind) -> PipelineRun {
        let mut run = PipelineRun::start(kind);
        log::info!("Run {} ({}) started", run.id, kind);

        match self.run_stages(&mut run).await {
            Ok(RunStatus::PartialFailure) => {
                let detail = degraded_detail(run.scraper_failures(), run.scraper_fallbacks());
                run.finish(RunStatus::PartialFailure, Some(detail));
            }
            Ok(status) => run.finish(status, None),
            Err(e) => {
                log::error!("Run {} failed: {}", run.id, e);
                run.finish(RunStatus::Failed, Some(e.to_string()));
            }
        }

        if let Err(e) = with_retry(&self.retry, "append run log", || self.store.append_log(&run)).await
        {
            log::error!("Run {} could not be logged: {}", run.id, e);
        }

        log::info!(
            "Run {} finished: {:?} in {}ms ({} scraped, {} new, {} duplicates ({:.1}%), {} upserted)",
            run.id,
            run.status,
            run.elapsed().map_or(0, |d| d.num_milliseconds()),
            run.counts.scraped,
            run.counts.new,
            run.counts.duplicates(),
            run.counts.duplicate_rate(),
            run.counts.upserted
        );

        *self.last_run.write().await = Some(run.clone());
        run
    }

    async fn run_stages(&self, run: &mut PipelineRun) -> Result<RunStatus> {
        // Stage 1: collect
        let collected = self
            .collector
            .collect(self.registry.scrapers(), &self.targets)
            .await;
        run.scrapers = collected.tally.clone();
        run.counts.scraped = collected.events.len();

        if collected.all_failed() {
            return Err(AppError::AllScrapersFailed {
                calls: collected.calls,
            });
        }

        // Stage 2: dedupe against a fresh index
        let mut index = with_retry(&self.retry, "load index", || self.store.load_index()).await?;
        log::info!("Loaded index with {} canonical events", index.len());

        let outcome = self.dedup.process(&mut index, &collected.events, Utc::now());
        run.counts = outcome.counts;

        // Stage 3: persist
        run.counts.upserted = self.writer.upsert_all(&outcome.upserts).await?;

        // Stage 4: stats
        let stats = StoredStats::new(StatsAggregator::compute(index.events()));
        with_retry(&self.retry, "write stats", || self.store.write_stats(&stats)).await?;

        if collected.is_degraded() {
            Ok(RunStatus::PartialFailure)
        } else {
            Ok(RunStatus::Success)
        }
    }
}

fn degraded_detail(failures: usize, fallbacks: usize) -> String {
    let mut parts = Vec::new();
    if failures > 0 {
        parts.push(format!("{failures} scraper call(s) failed"));
    }
    if fallbacks > 0 {
        parts.push(format!("{fallbacks} call(s) served demo data"));
    }
    format!("{}; continued with partial data", parts.join(", "))
}
