// src/pipeline/query.rs

//! Read-side views over the store for presentation.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::StoreResult;
use crate::models::{CanonicalEvent, PipelineRun, StoredStats};
use crate::storage::EventStore;

const UPCOMING_LIMIT: usize = 20;
const RECENT_LIMIT: usize = 10;

/// Event query parameters. Empty strings and `None` match everything.
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Case-insensitive substring of the city
    pub city: String,
    /// Case-insensitive exact platform among the event's sources
    pub platform: String,
    /// Case-insensitive substring of the category
    pub category: String,
    /// Only free (`true`) or only paid (`false`) events
    pub is_free: Option<bool>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            city: String::new(),
            platform: String::new(),
            category: String::new(),
            is_free: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl EventFilter {
    pub fn matches(&self, event: &CanonicalEvent) -> bool {
        let contains = |haystack: &str, needle: &str| {
            needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
        };

        contains(&event.city, &self.city)
            && contains(&event.category, &self.category)
            && self.is_free.is_none_or(|free| event.is_free == free)
            && (self.platform.is_empty()
                || event
                    .platforms()
                    .iter()
                    .any(|p| p.eq_ignore_ascii_case(&self.platform)))
    }
}

/// One page of matching events.
#[derive(Debug, Clone, Serialize)]
pub struct EventPage {
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub events: Vec<CanonicalEvent>,
}

/// Filter and paginate events, keeping store order.
pub fn filter_events(events: &[CanonicalEvent], filter: &EventFilter) -> EventPage {
    let matching: Vec<&CanonicalEvent> = events.iter().filter(|e| filter.matches(e)).collect();

    EventPage {
        total: matching.len(),
        offset: filter.offset,
        limit: filter.limit,
        events: matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .cloned()
            .collect(),
    }
}

/// Everything a dashboard shows, read in one go.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    /// Latest committed stats; survives later failed runs
    pub stats: Option<StoredStats>,
    pub last_run: Option<PipelineRun>,
    pub last_committed_run: Option<PipelineRun>,
    /// Soonest events dated today or later
    pub upcoming: Vec<CanonicalEvent>,
    /// Most recently discovered events
    pub recent: Vec<CanonicalEvent>,
}

/// Assemble the dashboard view as of `today`.
pub async fn load_dashboard(store: &dyn EventStore, today: NaiveDate) -> StoreResult<DashboardView> {
    let stats = store.load_stats().await?;
    let runs = store.load_runs().await?;
    let events = store.load_events().await?;

    let today = today.format("%Y-%m-%d").to_string();
    let mut upcoming: Vec<CanonicalEvent> = events
        .iter()
        .filter(|e| !e.date.is_empty() && e.date >= today)
        .cloned()
        .collect();
    upcoming.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.title.cmp(&b.title)));
    upcoming.truncate(UPCOMING_LIMIT);

    let mut recent = events;
    recent.sort_by(|a, b| b.first_seen.cmp(&a.first_seen));
    recent.truncate(RECENT_LIMIT);

    Ok(DashboardView {
        stats,
        last_committed_run: runs.iter().rev().find(|r| r.status.is_committed()).cloned(),
        last_run: runs.last().cloned(),
        upcoming,
        recent,
    })
}
