//! In-memory storage backend.
//!
//! Keeps everything behind a mutex and counts calls, so it doubles as a
//! store for dry runs and tests. Failures can be queued per operation.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::models::{CanonicalEvent, PipelineRun, StoredStats};
use crate::storage::EventStore;

#[derive(Debug, Default)]
struct State {
    events: Vec<CanonicalEvent>,
    positions: HashMap<String, usize>,
    runs: Vec<PipelineRun>,
    stats: Option<StoredStats>,
    calls: StoreCalls,
    upsert_failures: VecDeque<StoreError>,
    load_failures: VecDeque<StoreError>,
    stats_failures: VecDeque<StoreError>,
}

/// Call counters of a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub loads: usize,
    pub upserts: usize,
    pub logs: usize,
    pub stats_writes: usize,
}

impl StoreCalls {
    /// Calls that changed events or stats.
    pub fn data_writes(&self) -> usize {
        self.upserts + self.stats_writes
    }
}

/// Event store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing canonical set.
    pub fn with_events(events: impl IntoIterator<Item = CanonicalEvent>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for event in events {
                upsert_one(&mut state, event);
            }
        }
        store
    }

    /// Make the next `upsert_batch` calls fail with these errors, in order.
    pub fn fail_upserts(&self, errors: impl IntoIterator<Item = StoreError>) {
        self.lock().upsert_failures.extend(errors);
    }

    /// Make the next `load_events` calls fail with these errors, in order.
    pub fn fail_loads(&self, errors: impl IntoIterator<Item = StoreError>) {
        self.lock().load_failures.extend(errors);
    }

    /// Make the next `write_stats` calls fail with these errors, in order.
    pub fn fail_stats_writes(&self, errors: impl IntoIterator<Item = StoreError>) {
        self.lock().stats_failures.extend(errors);
    }

    pub fn calls(&self) -> StoreCalls {
        self.lock().calls
    }

    pub fn events(&self) -> Vec<CanonicalEvent> {
        self.lock().events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn upsert_one(state: &mut State, event: CanonicalEvent) {
    match state.positions.get(&event.id) {
        Some(&i) => state.events[i] = event,
        None => {
            state.positions.insert(event.id.clone(), state.events.len());
            state.events.push(event);
        }
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn load_events(&self) -> StoreResult<Vec<CanonicalEvent>> {
        let mut state = self.lock();
        state.calls.loads += 1;
        if let Some(err) = state.load_failures.pop_front() {
            return Err(err);
        }
        Ok(state.events.clone())
    }

    async fn upsert_batch(&self, events: &[CanonicalEvent]) -> StoreResult<usize> {
        let mut state = self.lock();
        state.calls.upserts += 1;
        if let Some(err) = state.upsert_failures.pop_front() {
            return Err(err);
        }
        for event in events {
            upsert_one(&mut state, event.clone());
        }
        Ok(events.len())
    }

    async fn append_log(&self, run: &PipelineRun) -> StoreResult<()> {
        let mut state = self.lock();
        state.calls.logs += 1;
        state.runs.push(run.clone());
        Ok(())
    }

    async fn write_stats(&self, stats: &StoredStats) -> StoreResult<()> {
        let mut state = self.lock();
        state.calls.stats_writes += 1;
        if let Some(err) = state.stats_failures.pop_front() {
            return Err(err);
        }
        state.stats = Some(stats.clone());
        Ok(())
    }

    async fn load_stats(&self) -> StoreResult<Option<StoredStats>> {
        Ok(self.lock().stats.clone())
    }

    async fn load_runs(&self) -> StoreResult<Vec<PipelineRun>> {
        Ok(self.lock().runs.clone())
    }
}
