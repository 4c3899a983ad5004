// src/pipeline/mod.rs

//! Collection pipeline: dedup, stats, orchestration, and scheduling.
//!
//! - `Pipeline`: Single-flight run of collect, dedup, persist, and stats
//! - `Scheduler`: Interval and manual triggers over one `Pipeline`
//! - `query`: Read-side views for presentation

pub mod dedup;
pub mod fuzzy;
pub mod index;
pub mod normalize;
pub mod orchestrator;
pub mod query;
pub mod scheduler;
pub mod stats;

pub use dedup::{Classification, DedupOutcome, Deduplicator};
pub use index::{DedupIndex, EventSlot};
pub use normalize::{content_hash, normalize_date, normalize_text};
pub use orchestrator::{Pipeline, TriggerAck, TriggerOutcome};
pub use query::{DashboardView, EventFilter, EventPage, filter_events, load_dashboard};
pub use scheduler::Scheduler;
pub use stats::StatsAggregator;
