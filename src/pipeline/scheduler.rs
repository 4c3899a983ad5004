// src/pipeline/scheduler.rs

//! Periodic and manual triggering of pipeline runs.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::models::TriggerKind;
use crate::pipeline::{Pipeline, TriggerAck};

/// Fires scheduled runs on a fixed interval.
///
/// Scheduled and manual triggers share the pipeline's gate, so a tick that
/// lands during a run is skipped. Stopping the timer never cancels a run
/// that is already in flight.
pub struct Scheduler {
    pipeline: Pipeline,
    interval: Duration,
    run_on_start: bool,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, interval: Duration) -> Self {
        Self {
            pipeline,
            interval,
            run_on_start: false,
            shutdown: None,
            task: None,
        }
    }

    /// Fire the first scheduled run immediately instead of after one interval.
    pub fn run_on_start(mut self, enabled: bool) -> Self {
        self.run_on_start = enabled;
        self
    }

    pub fn is_started(&self) -> bool {
        self.task.is_some()
    }

    /// Start the timer. Calling it again while started does nothing.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }

        let (tx, mut rx) = watch::channel(false);
        let pipeline = self.pipeline.clone();
        let interval = self.interval;
        let first = if self.run_on_start {
            Instant::now()
        } else {
            Instant::now() + interval
        };

        log::info!(
            "Scheduler started (every {}s, run on start: {})",
            interval.as_secs(),
            self.run_on_start
        );

        self.task = Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval_at(first, interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        match pipeline.spawn_trigger(TriggerKind::Scheduled) {
                            TriggerAck::Accepted(_) => log::debug!("Scheduled run started"),
                            TriggerAck::AlreadyRunning => {
                                log::info!("Scheduled tick skipped: run in progress")
                            }
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
            log::info!("Scheduler stopped");
        }));
        self.shutdown = Some(tx);
    }

    /// Start a manual run through the same gate as scheduled runs.
    pub fn trigger_manual(&self) -> TriggerAck {
        self.pipeline.spawn_trigger(TriggerKind::Manual)
    }

    /// Stop the timer and wait for its task to exit.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("Scheduler task ended abnormally: {e}");
            }
        }
    }
}
