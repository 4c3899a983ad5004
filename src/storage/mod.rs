//! Storage abstractions for canonical event persistence.
//!
//! The store holds three things:
//! - the canonical event set, upserted by id and never deleted,
//! - the append-only run log,
//! - a single stats row, overwritten after every committed run.
//!
//! ## Directory Structure (local backend)
//!
//! ```text
//! storage/
//! ├── events.json   # Canonical events
//! ├── runs.json     # Run log, oldest first
//! ├── stats.json    # Latest stats snapshot
//! └── run.lock      # Held while a run is in flight
//! ```

pub mod local;
pub mod memory;
pub mod writer;

use std::any::Any;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::{CanonicalEvent, PipelineRun, StoredStats};
use crate::pipeline::DedupIndex;

// Re-export for convenience
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use writer::{BatchWriter, RetryPolicy, with_retry};

/// Exclusive claim on running the pipeline against a store.
///
/// Released when dropped.
pub struct RunLease {
    _held: Option<Box<dyn Any + Send + Sync>>,
}

impl RunLease {
    /// Keep `guard` alive for as long as the lease.
    pub fn new(guard: impl Any + Send + Sync) -> Self {
        Self {
            _held: Some(Box::new(guard)),
        }
    }

    /// A lease that guards nothing, for stores private to one process.
    pub fn unguarded() -> Self {
        Self { _held: None }
    }
}

/// Trait for event store backends.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Load every canonical event.
    async fn load_events(&self) -> StoreResult<Vec<CanonicalEvent>>;

    /// Build a fresh dedup index from the stored events.
    async fn load_index(&self) -> StoreResult<DedupIndex> {
        Ok(DedupIndex::from_events(self.load_events().await?))
    }

    /// Insert or replace events by id. Returns how many were applied.
    async fn upsert_batch(&self, events: &[CanonicalEvent]) -> StoreResult<usize>;

    /// Append one entry to the run log.
    async fn append_log(&self, run: &PipelineRun) -> StoreResult<()>;

    /// Replace the stats row.
    async fn write_stats(&self, stats: &StoredStats) -> StoreResult<()>;

    /// Read the stats row, if one was ever written.
    async fn load_stats(&self) -> StoreResult<Option<StoredStats>>;

    /// Read the run log, oldest first.
    async fn load_runs(&self) -> StoreResult<Vec<PipelineRun>>;

    /// Claim the store for one run. `Ok(None)` means someone else holds it.
    fn try_lease(&self) -> StoreResult<Option<RunLease>> {
        Ok(Some(RunLease::unguarded()))
    }
}
