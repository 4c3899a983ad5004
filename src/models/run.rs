//! Pipeline run log records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What started a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Scheduled => write!(f, "scheduled"),
            TriggerKind::Manual => write!(f, "manual"),
        }
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    PartialFailure,
    Failed,
}

impl RunStatus {
    /// Whether the run committed data a dashboard may show.
    pub fn is_committed(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::PartialFailure)
    }
}

/// Classification and persistence counters for one run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunCounts {
    pub scraped: usize,
    pub new: usize,
    pub dup_exact: usize,
    pub dup_hash: usize,
    pub dup_fuzzy: usize,
    #[serde(default)]
    pub upserted: usize,
}

impl RunCounts {
    /// Total duplicates across all three layers.
    pub fn duplicates(&self) -> usize {
        self.dup_exact + self.dup_hash + self.dup_fuzzy
    }

    /// Share of scraped events that were duplicates, in percent.
    pub fn duplicate_rate(&self) -> f64 {
        if self.scraped == 0 {
            return 0.0;
        }
        self.duplicates() as f64 / self.scraped as f64 * 100.0
    }
}

/// Outcomes of one platform's scraper calls.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScraperTally {
    pub successes: usize,
    pub failures: usize,
    /// Calls that failed but were answered with demo data
    #[serde(default)]
    pub fallbacks: usize,
}

/// One entry in the append-only run log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineRun {
    pub id: String,
    pub trigger: TriggerKind,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub counts: RunCounts,
    #[serde(default)]
    pub scrapers: BTreeMap<String, ScraperTally>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineRun {
    /// Open a new run in the `Running` state.
    pub fn start(trigger: TriggerKind) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            trigger,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            counts: RunCounts::default(),
            scrapers: BTreeMap::new(),
            error: None,
        }
    }

    /// Close the run with a terminal status.
    pub fn finish(&mut self, status: RunStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock duration, once finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    /// Total scraper call failures across platforms.
    pub fn scraper_failures(&self) -> usize {
        self.scrapers.values().map(|t| t.failures).sum()
    }

    /// Total calls answered with demo data across platforms.
    pub fn scraper_fallbacks(&self) -> usize {
        self.scrapers.values().map(|t| t.fallbacks).sum()
    }
}
