//! Aggregate statistics over the canonical event set.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counts derived from the canonical event set alone.
///
/// Contains no timestamps, so two snapshots of the same set compare equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_events: usize,
    /// Events reported by more than one listing
    pub multi_source_events: usize,
    /// Sum of listings across all events
    pub total_reports: usize,
    #[serde(default)]
    pub free_events: usize,
    #[serde(default)]
    pub paid_events: usize,
    /// Keyed by case-folded city
    pub by_city: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub by_platform: BTreeMap<String, usize>,
    /// Keyed by month (`YYYY-MM`)
    pub by_month: BTreeMap<String, usize>,
}

impl StatsSnapshot {
    /// Share of free events, rounded to a whole percent.
    pub fn free_percentage(&self) -> u32 {
        if self.total_events == 0 {
            return 0;
        }
        (self.free_events as f64 / self.total_events as f64 * 100.0).round() as u32
    }
}

/// The single persisted stats row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredStats {
    pub updated_at: DateTime<Utc>,
    pub snapshot: StatsSnapshot,
}

impl StoredStats {
    pub fn new(snapshot: StatsSnapshot) -> Self {
        Self {
            updated_at: Utc::now(),
            snapshot,
        }
    }
}
